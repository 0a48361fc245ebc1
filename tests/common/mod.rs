//! Common test utilities

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use pib_crawler::config::Config;
use pib_crawler::crawler::PortalClient;
use pib_crawler::models::ExtractedRecord;
use pib_crawler::storage::PersistenceSink;
use wiremock::MockServer;

/// Configuration pointing every endpoint at the mock server, with no delays
pub fn mock_config(server: &MockServer) -> Config {
    Config::for_mock_server(&server.uri())
}

pub fn mock_client(server: &MockServer) -> Arc<PortalClient> {
    Arc::new(PortalClient::new(&mock_config(server)).expect("client"))
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Legacy search page carrying the hidden ASP.NET state fields
pub fn search_page(event_validation: Option<&str>) -> String {
    let validation = event_validation
        .map(|v| format!(r#"<input type="hidden" name="__EVENTVALIDATION" value="{v}" />"#))
        .unwrap_or_default();
    format!(
        r#"<html><body><form id="form1">
        <input type="hidden" name="__VIEWSTATE" id="__VIEWSTATE" value="dDwtMTA4NzE=" />
        <input type="hidden" name="__VIEWSTATEGENERATOR" id="__VIEWSTATEGENERATOR" value="C2EE9ABB" />
        {validation}
        </form></body></html>"#
    )
}

/// Release detail page in the shared template
pub fn release_page(title: &str, body: &str) -> String {
    format!(
        r#"<html><body>
        <div id="MinistryName">Ministry of Finance</div>
        <h2 id="Titleh2">{title}</h2>
        <div id="PrDateTime">Posted On: 05 JAN 2024 3:55PM by PIB Delhi</div>
        <div class="innner-page-main-about-us-content-right-part">
            <p>{body}</p>
            <p>******</p>
            <p>Release ID: 1</p>
        </div>
        </body></html>"#
    )
}

/// Non-canonical release page linking to its English sibling
pub fn hindi_page(english_prid: &str) -> String {
    format!(
        r#"<html><body>
        <h2 id="Titleh2">मंत्रिमंडल ने योजना को मंजूरी दी</h2>
        <div class="ReleaseLang">
            <a href="/PressReleasePage.aspx?PRID={english_prid}">English</a>
        </div>
        </body></html>"#
    )
}

/// Sink that keeps every batch in memory
#[derive(Clone, Default)]
pub struct MemorySink {
    pub days: Arc<Mutex<Vec<(NaiveDate, Vec<ExtractedRecord>)>>>,
    pub finished: Arc<Mutex<Option<Vec<ExtractedRecord>>>>,
}

impl MemorySink {
    pub fn day_prids(&self) -> Vec<(NaiveDate, Vec<String>)> {
        self.days
            .lock()
            .unwrap()
            .iter()
            .map(|(date, records)| {
                let mut prids: Vec<String> =
                    records.iter().map(|r| r.prid().to_string()).collect();
                prids.sort();
                (*date, prids)
            })
            .collect()
    }
}

impl PersistenceSink for MemorySink {
    fn write_day(&self, date: NaiveDate, records: &[ExtractedRecord]) -> anyhow::Result<()> {
        self.days.lock().unwrap().push((date, records.to_vec()));
        Ok(())
    }

    fn finish(&self, records: &[ExtractedRecord]) -> anyhow::Result<()> {
        *self.finished.lock().unwrap() = Some(records.to_vec());
        Ok(())
    }
}
