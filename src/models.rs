//! Decoded record types shared by the decoders, the blob store, and the
//! subscriber bus's JSON wire form. Monetary fields are raw integers in
//! hundredths of a rupee; division by 100 happens only at presentation
//! (see SPEC_FULL.md §3).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordHeader {
    pub transcode: u16,
    pub timestamp: u32,
    pub message_length: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub timestamp: u32,
    pub security_token: u32,
    pub last_traded_price: u32,
    pub best_buy_quantity: u64,
    pub best_buy_price: u32,
    pub best_sell_quantity: u64,
    pub best_sell_price: u32,
    pub total_traded_quantity: u64,
    pub average_traded_price: u32,
    pub open_price: u32,
    pub high_price: u32,
    pub low_price: u32,
    pub close_price: u32,
    pub interval_open_price: u32,
    pub interval_high_price: u32,
    pub interval_low_price: u32,
    pub interval_close_price: u32,
    pub interval_total_traded_quantity: u64,
    pub indicative_close_price: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub timestamp: u32,
    pub index_token: u32,
    pub open_index_value: u32,
    pub current_index_value: u32,
    pub high_index_value: u32,
    pub low_index_value: u32,
    pub percentage_change: u32,
    pub interval_open_index_value: u32,
    pub interval_high_index_value: u32,
    pub interval_low_index_value: u32,
    pub interval_close_index_value: u32,
    pub indicative_close_index_value: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallAuctionSnapshot {
    pub timestamp: u32,
    pub security_token: u32,
    pub last_traded_price: u32,
    pub best_buy_quantity: u64,
    pub best_buy_price: u32,
    pub best_sell_quantity: u64,
    pub best_sell_price: u32,
    pub total_traded_quantity: u64,
    pub average_traded_price: u32,
    pub open_price: u32,
    pub high_price: u32,
    pub low_price: u32,
    pub close_price: u32,
    pub buy_bbmm_flag: char,
    pub sell_bbmm_flag: char,
    pub indicative_traded_quantity: u64,
    pub first_open_price: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementCycle {
    TPlus0,
    TPlus1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermittedToTrade {
    NotPermitted,
    Permitted,
    BseExclusive,
}

impl PermittedToTrade {
    pub fn from_code(code: u16) -> Self {
        match code {
            1 => PermittedToTrade::Permitted,
            2 => PermittedToTrade::BseExclusive,
            _ => PermittedToTrade::NotPermitted,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            PermittedToTrade::NotPermitted => "listed, not permitted to trade",
            PermittedToTrade::Permitted => "permitted to trade",
            PermittedToTrade::BseExclusive => "BSE exclusive listing",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityMaster {
    pub token_number: u32,
    pub symbol: String,
    pub series: String,
    pub issued_capital: f64,
    pub settlement_cycle: SettlementCycle,
    pub company_name: String,
    pub permitted_to_trade: PermittedToTrade,
    pub last_updated: chrono::NaiveDate,
}

/// A bhavcopy numeric column. Parse failures keep the raw token rather
/// than being coerced to a misleading `0` (SPEC_FULL.md §4.2: "that
/// field retains the raw string token (best-effort); the record is not
/// dropped").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BhavcopyField {
    Number(f64),
    Raw(String),
}

impl BhavcopyField {
    pub fn parse(token: &str) -> Self {
        match token.parse::<f64>() {
            Ok(n) => BhavcopyField::Number(n),
            Err(_) => BhavcopyField::Raw(token.to_string()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            BhavcopyField::Number(n) => Some(*n),
            BhavcopyField::Raw(_) => None,
        }
    }

    /// Lossless textual form for persistence: the number re-rendered,
    /// or the raw token untouched.
    pub fn to_storage_string(&self) -> String {
        match self {
            BhavcopyField::Number(n) => n.to_string(),
            BhavcopyField::Raw(s) => s.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BhavcopyRow {
    pub business_date: chrono::NaiveDate,
    pub symbol: String,
    pub series: String,
    pub trade_high_price: BhavcopyField,
    pub trade_low_price: BhavcopyField,
    pub opening_price: BhavcopyField,
    pub closing_price: BhavcopyField,
    pub previous_close_price: BhavcopyField,
    pub total_traded_quantity: BhavcopyField,
    pub total_traded_value: BhavcopyField,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordKind {
    Mkt,
    Ind,
    Ca2,
    Securities,
    Bhavcopy,
}

impl RecordKind {
    pub fn label(&self) -> &'static str {
        match self {
            RecordKind::Mkt => "MKT",
            RecordKind::Ind => "IND",
            RecordKind::Ca2 => "CA2",
            RecordKind::Securities => "SECURITIES",
            RecordKind::Bhavcopy => "BHAVCOPY",
        }
    }
}

/// A decoded batch of one record kind, ready for persistence and for
/// publication on the subscriber bus.
#[derive(Debug, Clone)]
pub enum RecordBatch {
    Mkt(Vec<MarketSnapshot>),
    Ind(Vec<IndexSnapshot>),
    Ca2(Vec<CallAuctionSnapshot>),
    Securities(Vec<SecurityMaster>),
    Bhavcopy(Vec<BhavcopyRow>),
}

impl RecordBatch {
    pub fn kind(&self) -> RecordKind {
        match self {
            RecordBatch::Mkt(_) => RecordKind::Mkt,
            RecordBatch::Ind(_) => RecordKind::Ind,
            RecordBatch::Ca2(_) => RecordKind::Ca2,
            RecordBatch::Securities(_) => RecordKind::Securities,
            RecordBatch::Bhavcopy(_) => RecordKind::Bhavcopy,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RecordBatch::Mkt(v) => v.len(),
            RecordBatch::Ind(v) => v.len(),
            RecordBatch::Ca2(v) => v.len(),
            RecordBatch::Securities(v) => v.len(),
            RecordBatch::Bhavcopy(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The JSON wire form published on the subscriber bus: `{ "kind":
    /// ..., "records": [...] }` (SPEC_FULL.md §6).
    pub fn to_wire_json(&self) -> serde_json::Value {
        let records = match self {
            RecordBatch::Mkt(v) => serde_json::to_value(v),
            RecordBatch::Ind(v) => serde_json::to_value(v),
            RecordBatch::Ca2(v) => serde_json::to_value(v),
            RecordBatch::Securities(v) => serde_json::to_value(v),
            RecordBatch::Bhavcopy(v) => serde_json::to_value(v),
        }
        .unwrap_or(serde_json::Value::Null);
        serde_json::json!({ "kind": self.kind().label(), "records": records })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permitted_to_trade_from_code() {
        assert_eq!(PermittedToTrade::from_code(0), PermittedToTrade::NotPermitted);
        assert_eq!(PermittedToTrade::from_code(1), PermittedToTrade::Permitted);
        assert_eq!(PermittedToTrade::from_code(2), PermittedToTrade::BseExclusive);
        assert_eq!(PermittedToTrade::from_code(99), PermittedToTrade::NotPermitted);
    }

    #[test]
    fn wire_json_shape() {
        let batch = RecordBatch::Ind(vec![]);
        let json = batch.to_wire_json();
        assert_eq!(json["kind"], "IND");
        assert!(json["records"].as_array().unwrap().is_empty());
    }

    #[test]
    fn bhavcopy_field_keeps_raw_token_on_parse_failure() {
        assert_eq!(BhavcopyField::parse("1234.50"), BhavcopyField::Number(1234.50));
        assert_eq!(BhavcopyField::parse("N/A"), BhavcopyField::Raw("N/A".to_string()));
        assert_eq!(BhavcopyField::parse("N/A").as_f64(), None);
        assert_eq!(BhavcopyField::parse("42").as_f64(), Some(42.0));
    }
}
