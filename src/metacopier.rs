/// metacopier.rs – Async client for the MetaCopier-style account REST API.
///
/// Responsibilities:
///  - List accounts and fetch per-account information concurrently
///  - Fetch open positions and 30-day closed-position history per account
///  - Normalize the API's heterogeneous payloads into `Account` / `Trade`
///
/// Field names vary by deployment, so all parsing goes through
/// `serde_json::Value` with fallback keys and documented defaults: numbers
/// default to 0, enums to an Unknown sentinel, and a failed per-account
/// information fetch degrades that account to a disconnected placeholder
/// instead of aborting the batch.
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use futures_util::future::join_all;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use crate::models::{Account, Platform, Trade, TradeSide};

// ---------------------------------------------------------------------------
// MetaCopierClient
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct MetaCopierClient {
    base_url: String,
    api_key: Option<String>,
    history_days: i64,
    http: Client,
}

impl MetaCopierClient {
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        timeout_seconds: f64,
        history_days: i64,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs_f64(timeout_seconds))
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            history_days,
            http,
        })
    }

    async fn get_json(&self, path: &str, params: &[(&str, String)]) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.http.get(&url).query(params);
        if let Some(key) = &self.api_key {
            req = req.header("X-API-KEY", key);
        }
        let resp = req.send().await.with_context(|| format!("GET {path}"))?;
        if !resp.status().is_success() {
            anyhow::bail!("API error on {path}: {}", resp.status());
        }
        resp.json::<Value>()
            .await
            .with_context(|| format!("parsing response from {path}"))
    }

    // ------------------------------------------------------------------
    // Accounts
    // ------------------------------------------------------------------

    /// Fetch all accounts plus their information endpoints.
    ///
    /// Per-account information fetches run concurrently; a single failure
    /// degrades that account to a zeroed, disconnected placeholder and does
    /// not cancel its siblings. Result order follows the account list.
    pub async fn fetch_accounts(&self) -> Result<Vec<Account>> {
        let raw = self.get_json("/accounts", &[]).await?;
        let items = as_array(&raw, "accounts");

        let futures = items.iter().filter_map(|acc| {
            let id = str_field(acc, &["id"])?;
            if id.is_empty() {
                return None;
            }
            Some(async move {
                match self
                    .get_json(&format!("/accounts/{id}/information"), &[])
                    .await
                {
                    Ok(info) => parse_account(acc, &info),
                    Err(e) => {
                        debug!("Information fetch failed for account {id}: {e}");
                        placeholder_from(acc)
                    }
                }
            })
        });

        let accounts = join_all(futures).await;
        if accounts.len() < items.len() {
            warn!(
                "Skipped {} account entr(ies) without an id",
                items.len() - accounts.len()
            );
        }
        Ok(accounts)
    }

    // ------------------------------------------------------------------
    // Positions and history
    // ------------------------------------------------------------------

    /// Currently open positions for one account.
    pub async fn fetch_open_positions(&self, account_id: &str) -> Result<Vec<Trade>> {
        let raw = self
            .get_json(&format!("/accounts/{account_id}/positions"), &[])
            .await?;
        Ok(as_array(&raw, "positions")
            .into_iter()
            .map(parse_trade)
            .collect())
    }

    /// Closed-position history for one account over the configured window.
    pub async fn fetch_trades(&self, account_id: &str) -> Result<Vec<Trade>> {
        let end = Utc::now();
        let start = end - Duration::days(self.history_days);
        let raw = self
            .get_json(
                &format!("/accounts/{account_id}/history/positions"),
                &[
                    ("startDate", start.to_rfc3339()),
                    ("endDate", end.to_rfc3339()),
                ],
            )
            .await?;
        Ok(as_array(&raw, "positions")
            .into_iter()
            .map(parse_trade)
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

/// Accept either a bare array or an object wrapping one under `key`.
fn as_array<'a>(v: &'a Value, key: &str) -> Vec<&'a Value> {
    match v {
        Value::Array(a) => a.iter().collect(),
        Value::Object(o) => o
            .get(key)
            .and_then(|inner| inner.as_array())
            .map(|a| a.iter().collect())
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn value_as_f64(v: &Value) -> Option<f64> {
    v.as_f64()
        .or_else(|| v.as_str().and_then(|s| s.parse::<f64>().ok()))
}

/// First present key rendered as a string (numbers included).
fn str_field(item: &Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        match item.get(key) {
            Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
            Some(Value::Number(n)) => return Some(n.to_string()),
            _ => {}
        }
    }
    None
}

/// First present numeric key; 0 when all are absent or malformed.
fn num_field(item: &Value, keys: &[&str]) -> f64 {
    opt_num_field(item, keys).unwrap_or(0.0)
}

fn opt_num_field(item: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| item.get(*key).and_then(value_as_f64))
}

/// Timestamps arrive as RFC-3339 strings or epoch milliseconds.
fn time_field(item: &Value, keys: &[&str]) -> Option<DateTime<Utc>> {
    for key in keys {
        match item.get(*key) {
            Some(Value::String(s)) => {
                if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                    return Some(dt.with_timezone(&Utc));
                }
            }
            Some(Value::Number(n)) => {
                if let Some(ms) = n.as_i64() {
                    if let Some(dt) = DateTime::from_timestamp_millis(ms) {
                        return Some(dt);
                    }
                }
            }
            _ => {}
        }
    }
    None
}

/// Extract the platform from whatever shape the API returns.
///
/// A plain string is matched directly; objects and other non-strings are
/// serialized first so variants like `{"type":"meta_trader_5"}` still
/// match. Missing or unrecognized shapes degrade to `Unknown`.
pub fn extract_platform(raw: Option<&Value>) -> Platform {
    match raw {
        None | Some(Value::Null) => Platform::Unknown,
        Some(Value::String(s)) => Platform::normalize(s),
        Some(other) => Platform::normalize(&other.to_string()),
    }
}

fn account_identity(acc: &Value) -> (String, String, String, String, Platform) {
    let id = str_field(acc, &["id"]).unwrap_or_default();
    let login = str_field(acc, &["number", "login"]).unwrap_or_default();
    let name = str_field(acc, &["alias", "name"]).unwrap_or_else(|| {
        if login.is_empty() {
            id.clone()
        } else {
            login.clone()
        }
    });
    let server = str_field(acc, &["server"]).unwrap_or_default();
    let platform = extract_platform(acc.get("type").or_else(|| acc.get("platform")));
    (id, name, login, server, platform)
}

/// Normalize one raw account + information pair.
pub fn parse_account(acc: &Value, info: &Value) -> Account {
    let (id, name, login, server, platform) = account_identity(acc);
    Account {
        id,
        name,
        login,
        server,
        platform,
        balance: num_field(info, &["balance"]),
        equity: num_field(info, &["equity"]),
        margin: num_field(info, &["usedMargin", "margin"]),
        free_margin: num_field(info, &["freeMargin", "free_margin"]),
        connected: info
            .get("connected")
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
        open_positions_count: num_field(info, &["openPositionsCount", "openTradesCount"]) as u32,
        unrealized_pnl: num_field(info, &["unrealizedProfit", "unrealizedPnl"]),
    }
}

/// Disconnected, zeroed account built from the list entry alone.
pub fn placeholder_from(acc: &Value) -> Account {
    let (id, name, login, server, platform) = account_identity(acc);
    Account::placeholder(id, name, login, server, platform)
}

/// Normalize one raw position/history entry.
pub fn parse_trade(p: &Value) -> Trade {
    Trade {
        id: str_field(p, &["id", "positionId", "ticket"]).unwrap_or_default(),
        symbol: str_field(p, &["symbol"]).unwrap_or_default(),
        side: TradeSide::normalize(&str_field(p, &["type", "side"]).unwrap_or_default()),
        volume: num_field(p, &["volume", "lots"]),
        open_price: num_field(p, &["openPrice", "entryPrice"]),
        close_price: opt_num_field(p, &["closePrice", "exitPrice"]),
        profit: num_field(p, &["profit", "pnl"]),
        swap: num_field(p, &["swap"]),
        commission: num_field(p, &["commission"]),
        open_time: time_field(p, &["openTime", "openedAt"]),
        close_time: time_field(p, &["closeTime", "closedAt"]),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn platform_from_string() {
        let v = json!("MetaTrader 5");
        assert_eq!(extract_platform(Some(&v)), Platform::MT5);
    }

    #[test]
    fn platform_from_object_shape() {
        let v = json!({"type": "meta_trader_4", "build": 1420});
        assert_eq!(extract_platform(Some(&v)), Platform::MT4);
    }

    #[test]
    fn platform_missing_is_unknown() {
        assert_eq!(extract_platform(None), Platform::Unknown);
        assert_eq!(extract_platform(Some(&Value::Null)), Platform::Unknown);
        let v = json!({"weird": true});
        assert_eq!(extract_platform(Some(&v)), Platform::Unknown);
    }

    #[test]
    fn parse_account_applies_defaults() {
        let acc = json!({"id": "a1", "number": 12345, "server": "FTMO-Server2", "type": "mt5"});
        let info = json!({"balance": "10000.5", "connected": true});
        let a = parse_account(&acc, &info);
        assert_eq!(a.id, "a1");
        assert_eq!(a.login, "12345");
        assert_eq!(a.name, "12345"); // no alias → login stands in
        assert_eq!(a.platform, Platform::MT5);
        assert_eq!(a.balance, 10000.5); // numeric string accepted
        assert_eq!(a.equity, 0.0); // absent → 0
        assert_eq!(a.margin, 0.0);
        assert!(a.connected);
    }

    #[test]
    fn parse_account_prefers_alias() {
        let acc = json!({"id": "a1", "alias": "FTMO 100k", "number": 7});
        let a = parse_account(&acc, &json!({}));
        assert_eq!(a.name, "FTMO 100k");
        assert!(!a.connected);
    }

    #[test]
    fn parse_trade_with_fallback_keys() {
        let p = json!({
            "ticket": 99887766,
            "symbol": "XAUUSD",
            "side": "sell",
            "lots": 0.25,
            "entryPrice": 2300.5,
            "exitPrice": 2290.0,
            "pnl": 262.5,
            "openedAt": "2026-08-20T10:00:00Z",
            "closedAt": "2026-08-20T14:30:00Z",
        });
        let t = parse_trade(&p);
        assert_eq!(t.id, "99887766");
        assert_eq!(t.side, TradeSide::Sell);
        assert_eq!(t.volume, 0.25);
        assert_eq!(t.open_price, 2300.5);
        assert_eq!(t.close_price, Some(2290.0));
        assert_eq!(t.profit, 262.5);
        assert!(!t.is_open());
    }

    #[test]
    fn parse_trade_open_position_has_no_close_time() {
        let p = json!({
            "id": "pos-1",
            "symbol": "EURUSD",
            "type": "POSITION_TYPE_BUY",
            "volume": 1.0,
            "openPrice": 1.09,
            "profit": -12.3,
            "openTime": 1766224800000_i64,
        });
        let t = parse_trade(&p);
        assert_eq!(t.side, TradeSide::Buy);
        assert!(t.is_open());
        assert!(t.open_time.is_some());
        assert_eq!(t.close_price, None);
    }

    #[test]
    fn as_array_accepts_wrapped_and_bare() {
        let bare = json!([{"id": "a"}]);
        let wrapped = json!({"accounts": [{"id": "a"}, {"id": "b"}]});
        let scalar = json!(42);
        assert_eq!(as_array(&bare, "accounts").len(), 1);
        assert_eq!(as_array(&wrapped, "accounts").len(), 2);
        assert!(as_array(&scalar, "accounts").is_empty());
    }
}
