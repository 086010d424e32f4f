use anyhow::{anyhow, bail, Context, Result};
use hmac::{Hmac, Mac};
use reqwest::blocking::Client;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::Url;
use serde_json::Value;
use sha2::Sha512;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

pub const DEFAULT_API_URL: &str = "https://cointracking.info/api/v1/";

type HmacSha512 = Hmac<Sha512>;

/// Credentials and endpoint for the CoinTracking API.
///
/// Built once at start-up and handed to [`CointrackingClient::new`].
#[derive(Clone)]
pub struct CointrackingConfig {
    pub api_url: String,
    pub api_key: String,
    pub api_secret: String,
}

impl CointrackingConfig {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    /// Loads config from env vars:
    /// - `COINTRACKING_API_KEY`    (required)
    /// - `COINTRACKING_API_SECRET` (required)
    /// - `COINTRACKING_API_URL`    (default: `https://cointracking.info/api/v1/`)
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("COINTRACKING_API_KEY")
            .context("COINTRACKING_API_KEY is not set")?;
        let api_secret = std::env::var("COINTRACKING_API_SECRET")
            .context("COINTRACKING_API_SECRET is not set")?;
        let api_url =
            std::env::var("COINTRACKING_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());

        Ok(Self::new(api_key, api_secret).with_api_url(api_url))
    }
}

impl fmt::Debug for CointrackingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CointrackingConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

/// Trade ordering for `getTrades`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeOrder {
    Asc,
    Desc,
}

impl TradeOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            TradeOrder::Asc => "ASC",
            TradeOrder::Desc => "DESC",
        }
    }
}

/// Field `getGroupedBalance` groups by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceGrouping {
    Exchange,
    Group,
    Type,
}

impl BalanceGrouping {
    pub fn as_str(self) -> &'static str {
        match self {
            BalanceGrouping::Exchange => "exchange",
            BalanceGrouping::Group => "group",
            BalanceGrouping::Type => "type",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GainsMethod {
    Fifo,
    Lifo,
    Hifo,
    Lofo,
    Hpfo,
    Lpfo,
    Hafo,
    Lafo,
}

impl GainsMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            GainsMethod::Fifo => "FIFO",
            GainsMethod::Lifo => "LIFO",
            GainsMethod::Hifo => "HIFO",
            GainsMethod::Lofo => "LOFO",
            GainsMethod::Hpfo => "HPFO",
            GainsMethod::Lpfo => "LPFO",
            GainsMethod::Hafo => "HAFO",
            GainsMethod::Lafo => "LAFO",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GainsPrice {
    Best,
    Transaction,
    Counterpart,
}

impl GainsPrice {
    pub fn as_str(self) -> &'static str {
        match self {
            GainsPrice::Best => "best",
            GainsPrice::Transaction => "transaction",
            GainsPrice::Counterpart => "counterpart",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostBasis {
    /// Recommended.
    Unsold,
    All,
}

impl CostBasis {
    pub fn as_str(self) -> &'static str {
        match self {
            CostBasis::Unsold => "unsold",
            CostBasis::All => "all",
        }
    }
}

/// Parameters of `getTrades`. `None` leaves the API default in place
/// (all trades, ascending by time, no time bounds).
#[derive(Debug, Clone, Default)]
pub struct TradesQuery {
    pub limit: Option<u32>,
    pub order: Option<TradeOrder>,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
}

/// Parameters of `getGains`. Defaults depend on the account settings.
#[derive(Debug, Clone, Default)]
pub struct GainsQuery {
    pub method: Option<GainsMethod>,
    pub price: Option<GainsPrice>,
    /// Excluding deposits/withdrawals is recommended.
    pub exclude_movements: Option<bool>,
    pub cost_basis: Option<CostBasis>,
    pub show_as_btc: Option<bool>,
}

/// API parameters in send order; `None` means "use the API default".
pub type Params = Vec<(&'static str, Option<String>)>;

/// Minimal CoinTracking API client (blocking HTTP, signed POST requests).
#[derive(Clone)]
pub struct CointrackingClient {
    http: Client,
    api_url: Url,
    api_key: String,
    api_secret: Vec<u8>,
}

impl fmt::Debug for CointrackingClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CointrackingClient")
            .field("api_url", &self.api_url.as_str())
            .field("api_key", &self.api_key)
            .finish_non_exhaustive()
    }
}

impl CointrackingClient {
    pub fn new(config: CointrackingConfig) -> Result<Self> {
        let api_url = validate_api_url(&config.api_url)?;

        if config.api_key.trim().is_empty() || config.api_secret.is_empty() {
            bail!("CoinTracking API key and secret must not be empty");
        }

        let http = Client::builder()
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            api_url,
            api_key: config.api_key,
            api_secret: config.api_secret.into_bytes(),
        })
    }

    /// Performs one signed API call and returns the decoded JSON body.
    ///
    /// Parameters set to `None` are not sent. The payload is signed with
    /// HMAC-SHA512 over the exact form body that goes on the wire.
    pub fn call(&self, api_method: &str, params: Params) -> Result<Value> {
        let body = build_payload(&params, api_method, current_nonce()?)?;
        let signature = sign_payload(&self.api_secret, &body)?;

        tracing::debug!(method = api_method, "POST {}", self.api_url);

        let response: Value = self
            .http
            .post(self.api_url.clone())
            .header("Key", &self.api_key)
            .header("Sign", signature)
            .header(
                CONTENT_TYPE,
                HeaderValue::from_static("application/x-www-form-urlencoded"),
            )
            .body(body)
            .send()
            .with_context(|| format!("{api_method}: POST {} failed", self.api_url))?
            .error_for_status()
            .with_context(|| format!("{api_method}: non-success status"))?
            .json()
            .with_context(|| format!("{api_method}: failed to parse JSON response"))?;

        check_api_error(api_method, &response)?;
        Ok(response)
    }

    /// All trades and transactions, like the website's "Trade List".
    pub fn get_trades(&self, query: &TradesQuery) -> Result<Value> {
        self.call(
            "getTrades",
            vec![
                ("limit", query.limit.map(|v| v.to_string())),
                ("order", query.order.map(|v| v.as_str().to_string())),
                ("start_time", query.start_time.map(|v| v.to_string())),
                ("end_time", query.end_time.map(|v| v.to_string())),
            ],
        )
    }

    /// Current account and coin balance ("Current Balance").
    pub fn get_balance(&self) -> Result<Value> {
        self.call("getBalance", Vec::new())
    }

    /// Historical values of all coins and the total account value.
    pub fn get_historical_summary(
        &self,
        show_as_btc: Option<bool>,
        start_time: Option<i64>,
        end_time: Option<i64>,
    ) -> Result<Value> {
        self.call(
            "getHistoricalSummary",
            vec![
                ("btc", show_as_btc.map(flag)),
                ("start_time", start_time.map(|v| v.to_string())),
                ("end_time", end_time.map(|v| v.to_string())),
            ],
        )
    }

    /// Historical amounts and values for one currency, or all of them when `currency` is `None`.
    pub fn get_historical_currency(
        &self,
        currency: Option<&str>,
        start_time: Option<i64>,
        end_time: Option<i64>,
    ) -> Result<Value> {
        self.call(
            "getHistoricalCurrency",
            vec![
                ("currency", currency.map(str::to_string)),
                ("start_time", start_time.map(|v| v.to_string())),
                ("end_time", end_time.map(|v| v.to_string())),
            ],
        )
    }

    /// Current balance grouped by exchange, trade group or transaction type.
    ///
    /// `trade_type` restricts the calculation to one type label, e.g. `Deposit`.
    pub fn get_grouped_balance(
        &self,
        group: Option<BalanceGrouping>,
        exclude_movements: Option<bool>,
        trade_type: Option<&str>,
    ) -> Result<Value> {
        self.call(
            "getGroupedBalance",
            vec![
                ("group", group.map(|g| g.as_str().to_string())),
                ("exclude_dep_with", exclude_movements.map(flag)),
                ("type", trade_type.map(str::to_string)),
            ],
        )
    }

    /// Realized and unrealized gains.
    pub fn get_gains(&self, query: &GainsQuery) -> Result<Value> {
        self.call(
            "getGains",
            vec![
                ("method", query.method.map(|m| m.as_str().to_string())),
                ("price", query.price.map(|p| p.as_str().to_string())),
                ("exclude_dep_with", query.exclude_movements.map(flag)),
                ("costbasis", query.cost_basis.map(|c| c.as_str().to_string())),
                ("btc", query.show_as_btc.map(flag)),
            ],
        )
    }
}

fn flag(value: bool) -> String {
    let bit = if value { "1" } else { "0" };
    bit.to_string()
}

/// URL-encodes the present parameters followed by `method` and `nonce`.
fn build_payload(params: &Params, api_method: &str, nonce: u128) -> Result<String> {
    let mut fields: Vec<(&str, String)> = params
        .iter()
        .filter_map(|(k, v)| v.as_ref().map(|v| (*k, v.clone())))
        .collect();
    fields.push(("method", api_method.to_string()));
    fields.push(("nonce", nonce.to_string()));

    serde_urlencoded::to_string(&fields).context("Failed to encode API payload")
}

/// Lowercase hex HMAC-SHA512 of `payload` keyed with the API secret.
fn sign_payload(secret: &[u8], payload: &str) -> Result<String> {
    let mut mac =
        HmacSha512::new_from_slice(secret).map_err(|e| anyhow!("Invalid API secret: {e}"))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn current_nonce() -> Result<u128> {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("System clock is before the Unix epoch")?;
    Ok(since_epoch.as_millis())
}

/// CoinTracking reports failures as `{"success": 0, "error": ..., "error_msg": ...}`.
fn check_api_error(api_method: &str, response: &Value) -> Result<()> {
    if response.get("success").and_then(|v| v.as_i64()) != Some(0) {
        return Ok(());
    }

    let msg = response
        .get("error_msg")
        .or_else(|| response.get("error"))
        .and_then(|v| v.as_str())
        .unwrap_or("unknown error");
    bail!("{api_method} failed: {msg}")
}

fn validate_api_url(api_url: &str) -> Result<Url> {
    let url =
        Url::parse(api_url).with_context(|| format!("Invalid COINTRACKING_API_URL: {api_url}"))?;

    match url.scheme() {
        "https" | "http" => {}
        other => {
            return Err(anyhow!(
                "Unsupported scheme '{other}' for COINTRACKING_API_URL (use {DEFAULT_API_URL})"
            ))
        }
    }

    if url.host_str().is_none() {
        return Err(anyhow!("COINTRACKING_API_URL is missing a host"));
    }

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_skips_absent_params() {
        let params: Params = vec![
            ("limit", Some("10".to_string())),
            ("order", None),
            ("start_time", None),
        ];

        let body = build_payload(&params, "getTrades", 1_500_000_000_000).unwrap();

        assert_eq!(body, "limit=10&method=getTrades&nonce=1500000000000");
    }

    #[test]
    fn test_payload_is_url_encoded() {
        let params: Params = vec![("type", Some("Gift/Tip(In)".to_string()))];

        let body = build_payload(&params, "getGroupedBalance", 1).unwrap();

        assert_eq!(body, "type=Gift%2FTip%28In%29&method=getGroupedBalance&nonce=1");
    }

    #[test]
    fn test_signature_is_hex_hmac_sha512() {
        let sig = sign_payload(b"secret", "limit=10&method=getTrades&nonce=1500000000000").unwrap();

        assert_eq!(
            sig,
            "fcc00952df4408033086f9c29db50f5b86304144eeefa78c3cf6bf022813a0ef\
             c92ecae44aea603324e7f55077e40ef573a5bd471f2ef2a8b78d52a30ab9afdd"
        );
    }

    #[test]
    fn test_api_error_is_reported() {
        let err = check_api_error(
            "getTrades",
            &json!({"success": 0, "error": "AUTH", "error_msg": "Invalid key"}),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "getTrades failed: Invalid key");

        let ok = json!({"success": 1, "method": "getTrades"});
        assert!(check_api_error("getTrades", &ok).is_ok());
    }

    #[test]
    fn test_config_validation() {
        assert!(CointrackingClient::new(CointrackingConfig::new("key", "secret")).is_ok());
        assert!(CointrackingClient::new(
            CointrackingConfig::new("key", "secret").with_api_url("ftp://cointracking.info/")
        )
        .is_err());
        assert!(CointrackingClient::new(CointrackingConfig::new("", "secret")).is_err());
    }

    #[test]
    fn test_debug_hides_secret() {
        let config = CointrackingConfig::new("key", "top-secret");
        assert!(!format!("{:?}", config).contains("top-secret"));
    }

    #[test]
    fn test_flags() {
        assert_eq!(flag(true), "1");
        assert_eq!(flag(false), "0");
        assert_eq!(GainsMethod::Hpfo.as_str(), "HPFO");
        assert_eq!(TradeOrder::Desc.as_str(), "DESC");
    }
}
