use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::blocking::Client as HttpClient;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE, SET_COOKIE, USER_AGENT};
use scraper::{Html, Selector};
use tracing::debug;

use crate::date::SolarDate;
use crate::error::{Error, Result};

/// Base address of the source site.
pub const DEFAULT_BASE_URL: &str = "http://airnow.tehran.ir";

/// Data-archive page, the target of both the handshake and the form posts.
pub const ARCHIVE_PATH: &str = "/home/DataArchive.aspx";

/// Station metadata page (establishment dates and districts).
pub const STATION_INFO_PATH: &str = "/home/stationInfo.aspx";

/// The search button the form post has to name to trigger a report.
const SEARCH_BUTTON: (&str, &str) = ("ctl00$ContentPlaceHolder1$btnSearch", "  نمایش   ");

/// Transient control fields the server rejects when echoed back.
const TRANSIENT_FIELDS: [&str; 2] = ["delcfrm", "btnfrm"];

const STATION_SELECT_ID: &str = "ContentPlaceHolder1_ddlStation";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(100);

/// One authenticated scraping session against the archive page.
///
/// The server validates an ASP.NET view-state handshake: a session cookie
/// plus the hidden form fields of the page the session was opened on. Both
/// are captured by [`SessionClient::open`] and merged into every subsequent
/// form post. The state is scoped to this value; reusing stale hidden
/// fields across sessions is rejected by the server, so open a fresh
/// session per pipeline run.
#[derive(Debug)]
pub struct SessionClient {
    http: HttpClient,
    base_url: String,
    cookie: String,
    form_state: BTreeMap<String, String>,
}

impl SessionClient {
    /// Fetch the archive page and capture the session cookie and hidden
    /// form fields.
    pub fn open(base_url: &str) -> Result<Self> {
        let http = build_http_client()?;
        let url = format!("{base_url}{ARCHIVE_PATH}");
        let response = http.get(&url).send()?.error_for_status()?;

        let cookie = response
            .headers()
            .get(SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_string())
            .ok_or_else(|| Error::Session("no session cookie in response".into()))?;

        let body = response.text()?;
        let hidden = parse_hidden_inputs(&body);
        if hidden.is_empty() {
            return Err(Error::Session(
                "archive page carries no hidden form fields".into(),
            ));
        }

        let mut form_state = BTreeMap::new();
        form_state.insert(SEARCH_BUTTON.0.to_string(), SEARCH_BUTTON.1.to_string());
        form_state.extend(hidden);

        debug!(fields = form_state.len(), "session opened");

        Ok(Self {
            http,
            base_url: base_url.to_string(),
            cookie,
            form_state,
        })
    }

    /// Submit the archive form for one station and day and return the raw
    /// response body. No retry here; transient failures propagate to the
    /// orchestration layer.
    pub fn request_station_day(
        &self,
        station: u32,
        date: SolarDate,
        time_unit: &str,
        decimal_places: u32,
    ) -> Result<String> {
        let mut form = self.form_state.clone();
        form.insert(
            "ctl00$ContentPlaceHolder1$ddlStation".into(),
            station.to_string(),
        );
        form.insert("ctl00$ContentPlaceHolder1$pddFrom".into(), date.to_string());
        form.insert("ctl00$ContentPlaceHolder1$pddTo".into(), date.to_string());
        form.insert(
            "ctl00$ContentPlaceHolder1$ddlReportType".into(),
            time_unit.to_string(),
        );
        form.insert(
            "ctl00$ContentPlaceHolder1$txtNumber".into(),
            decimal_places.to_string(),
        );

        let url = format!("{}{ARCHIVE_PATH}", self.base_url);
        let response = self
            .http
            .post(&url)
            .header(COOKIE, &self.cookie)
            .form(&form)
            .send()?
            .error_for_status()?;

        Ok(response.text()?)
    }

    /// Plain GET of a page on the source site, sharing the session cookie.
    pub fn get_page(&self, path: &str) -> Result<String> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .http
            .get(&url)
            .header(COOKIE, &self.cookie)
            .send()?
            .error_for_status()?;
        Ok(response.text()?)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Fetch the `(station id, display name)` pairs from the archive page's
/// station dropdown. Does not need an open session.
pub fn fetch_station_options(base_url: &str) -> Result<Vec<(u32, String)>> {
    let http = build_http_client()?;
    let url = format!("{base_url}{ARCHIVE_PATH}");
    let body = http.get(&url).send()?.error_for_status()?.text()?;
    station_options(&body)
}

/// Parse the station dropdown out of a page body.
pub fn station_options(body: &str) -> Result<Vec<(u32, String)>> {
    let document = Html::parse_document(body);
    let select =
        Selector::parse(&format!("select#{STATION_SELECT_ID} option")).expect("valid selector");

    let mut options = Vec::new();
    for option in document.select(&select) {
        let Some(value) = option.value().attr("value") else {
            continue;
        };
        let id: u32 = value.trim().parse().map_err(|_| {
            Error::Parse(format!("non-numeric station option value: {value:?}"))
        })?;
        let name = option.text().collect::<String>().trim().to_string();
        options.push((id, name));
    }

    if options.is_empty() {
        return Err(Error::Parse("station dropdown not found in page".into()));
    }
    Ok(options)
}

/// All `<input type="hidden">` name/value pairs of a page, minus the
/// transient control fields.
pub fn parse_hidden_inputs(body: &str) -> BTreeMap<String, String> {
    let document = Html::parse_document(body);
    let selector = Selector::parse(r#"input[type="hidden"]"#).expect("valid selector");

    let mut fields = BTreeMap::new();
    for input in document.select(&selector) {
        let Some(name) = input.value().attr("name") else {
            continue;
        };
        if TRANSIENT_FIELDS.contains(&name) {
            continue;
        }
        let value = input.value().attr("value").unwrap_or_default();
        fields.insert(name.to_string(), value.to_string());
    }
    fields
}

fn build_http_client() -> Result<HttpClient> {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_static(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
             (KHTML, like Gecko) Chrome/114.0.0.0 Safari/537.36",
        ),
    );
    headers.insert(
        "Accept",
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,\
             image/webp,image/apng,*/*;q=0.8",
        ),
    );
    headers.insert("Accept-Language", HeaderValue::from_static("en-US,en;q=0.9,fa;q=0.7"));

    let http = HttpClient::builder()
        .default_headers(headers)
        .timeout(REQUEST_TIMEOUT)
        .build()?;
    Ok(http)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FORM_PAGE: &str = r#"
        <html><body><form>
        <input type="hidden" name="__VIEWSTATE" value="dDwtNT" />
        <input type="hidden" name="__EVENTVALIDATION" value="ev123" />
        <input type="hidden" name="delcfrm" value="x" />
        <input type="hidden" name="btnfrm" value="y" />
        <input type="text" name="visible" value="z" />
        <select id="ContentPlaceHolder1_ddlStation">
          <option value="1">Station One</option>
          <option value="21"> Station Twenty-One </option>
        </select>
        </form></body></html>"#;

    #[test]
    fn hidden_inputs_drop_transient_fields() {
        let fields = parse_hidden_inputs(FORM_PAGE);
        assert_eq!(fields.len(), 2);
        assert_eq!(fields["__VIEWSTATE"], "dDwtNT");
        assert_eq!(fields["__EVENTVALIDATION"], "ev123");
        assert!(!fields.contains_key("delcfrm"));
        assert!(!fields.contains_key("btnfrm"));
    }

    #[test]
    fn station_options_parse_value_and_text() {
        let options = station_options(FORM_PAGE).unwrap();
        assert_eq!(
            options,
            vec![
                (1, "Station One".to_string()),
                (21, "Station Twenty-One".to_string())
            ]
        );
    }

    #[test]
    fn station_options_require_the_dropdown() {
        assert!(matches!(
            station_options("<html><body></body></html>"),
            Err(Error::Parse(_))
        ));
    }
}
