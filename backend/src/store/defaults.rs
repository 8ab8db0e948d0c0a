//! Built-in specs: Revolut stock and crypto exports to the Ghostfolio
//! activity import format.

use crate::models::{ColumnSpec, ColumnType, DestinationSpec, FileSpec, SourceSpec};
use crate::transform::filter::{FilterOperator, FilterRule};
use crate::transform::mapping::MappingSpec;
use crate::transform::operations::TransformSpec;

pub const REVOLUT_STOCKS: &str = "revolut_stocks";
pub const REVOLUT_CRYPTO: &str = "revolut_crypto";
pub const GHOSTFOLIO: &str = "ghostfolio";

pub fn sources() -> Vec<SourceSpec> {
    vec![revolut_stocks(), revolut_crypto()]
}

pub fn destinations() -> Vec<DestinationSpec> {
    vec![ghostfolio()]
}

pub fn mappings() -> Vec<MappingSpec> {
    vec![revolut_stocks_to_ghostfolio(), revolut_crypto_to_ghostfolio()]
}

pub fn revolut_stocks() -> SourceSpec {
    FileSpec::new(REVOLUT_STOCKS, "Revolut Stocks")
        .with_description("Revolut stock trading CSV export")
        .with_directory(REVOLUT_STOCKS)
        .with_column(ColumnSpec::new("Date", ColumnType::Datetime))
        .with_column(ColumnSpec::new("Ticker", ColumnType::String))
        .with_column(ColumnSpec::new("Type", ColumnType::String))
        .with_column(ColumnSpec::new("Quantity", ColumnType::Float))
        .with_column(ColumnSpec::new("Price per share", ColumnType::Money))
        .with_column(ColumnSpec::new("Total Amount", ColumnType::Money))
        .with_column(ColumnSpec::new("Currency", ColumnType::String).with_max_length(3))
        .with_column(ColumnSpec::new("FX Rate", ColumnType::Float))
}

pub fn revolut_crypto() -> SourceSpec {
    FileSpec::new(REVOLUT_CRYPTO, "Revolut Crypto")
        .with_description("Revolut crypto trading CSV export")
        .with_directory(REVOLUT_CRYPTO)
        .with_column(ColumnSpec::new("Symbol", ColumnType::String))
        .with_column(ColumnSpec::new("Type", ColumnType::String))
        .with_column(ColumnSpec::new("Quantity", ColumnType::Float))
        .with_column(ColumnSpec::new("Price", ColumnType::Money))
        .with_column(ColumnSpec::new("Value", ColumnType::Money))
        .with_column(ColumnSpec::new("Fees", ColumnType::Money))
        .with_column(ColumnSpec::new("Date", ColumnType::String))
}

pub fn ghostfolio() -> DestinationSpec {
    FileSpec::new(GHOSTFOLIO, "Ghostfolio")
        .with_description("Ghostfolio activity import format")
        .with_directory(GHOSTFOLIO)
        .with_column(ColumnSpec::new("date", ColumnType::Date).required())
        .with_column(ColumnSpec::new("symbol", ColumnType::String).required())
        .with_column(ColumnSpec::new("type", ColumnType::String).required())
        .with_column(ColumnSpec::new("quantity", ColumnType::Float).required())
        .with_column(ColumnSpec::new("unitPrice", ColumnType::Float).required())
        .with_column(ColumnSpec::new("fee", ColumnType::Float).with_default("0"))
        .with_column(ColumnSpec::new("currency", ColumnType::String).with_max_length(3))
        .with_column(ColumnSpec::new("account", ColumnType::String))
        .with_column(ColumnSpec::new("dataSource", ColumnType::String))
}

pub fn revolut_stocks_to_ghostfolio() -> MappingSpec {
    MappingSpec::new("revolut_stocks_to_ghostfolio", REVOLUT_STOCKS, GHOSTFOLIO)
        .with_name("Revolut Stocks → Ghostfolio")
        .with_description("Convert Revolut stock trades to Ghostfolio format")
        .with_field("date", TransformSpec::date_format("Date", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d"))
        .with_field("symbol", TransformSpec::suffix("Ticker", ".DE").when("Currency == 'EUR'"))
        .with_field(
            "type",
            TransformSpec::lookup(
                "Type",
                [
                    ("BUY - MARKET", "BUY"),
                    ("BUY - LIMIT", "BUY"),
                    ("SELL - MARKET", "SELL"),
                    ("SELL - LIMIT", "SELL"),
                    ("DIVIDEND", "DIVIDEND"),
                ],
            ),
        )
        .with_field("quantity", TransformSpec::direct("Quantity"))
        .with_field("unitPrice", TransformSpec::formula("`Price per share`"))
        .with_field("fee", TransformSpec::constant("0"))
        .with_field("currency", TransformSpec::direct("Currency"))
        .with_field("account", TransformSpec::constant("Revolut"))
        .with_field("dataSource", TransformSpec::constant("YAHOO"))
        .with_filter(FilterRule::new(
            "Type",
            FilterOperator::In,
            &["CASH TOP-UP", "CASH WITHDRAWAL", "CUSTODY FEE", "STOCK SPLIT"],
        ))
        .with_filter(FilterRule::new("Ticker", FilterOperator::IsEmpty, &[]))
}

pub fn revolut_crypto_to_ghostfolio() -> MappingSpec {
    MappingSpec::new("revolut_crypto_to_ghostfolio", REVOLUT_CRYPTO, GHOSTFOLIO)
        .with_name("Revolut Crypto → Ghostfolio")
        .with_description("Convert Revolut crypto trades to Ghostfolio format")
        .with_field("date", TransformSpec::date_format("Date", "%b %d, %Y, %I:%M:%S %p", "%Y-%m-%d"))
        .with_field("symbol", TransformSpec::suffix("Symbol", "-USD"))
        .with_field(
            "type",
            TransformSpec::lookup("Type", [("Buy", "BUY"), ("BUY", "BUY"), ("Sell", "SELL"), ("SELL", "SELL")]),
        )
        .with_field("quantity", TransformSpec::direct("Quantity"))
        .with_field("unitPrice", TransformSpec::formula("Price"))
        .with_field("fee", TransformSpec::formula("Fees"))
        .with_field("currency", TransformSpec::constant("USD"))
        .with_field("account", TransformSpec::constant("Revolut Crypto"))
        .with_field("dataSource", TransformSpec::constant("YAHOO"))
        .with_filter(FilterRule::new(
            "Type",
            FilterOperator::In,
            &["Transfer", "Payment", "Stake", "Unstake", "Send", "Receive"],
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceRecord;
    use crate::transform::executor::{Mapper, RowOutcome};

    fn record(pairs: &[(&str, &str)]) -> SourceRecord {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_defaults_are_consistent() {
        let destination = ghostfolio();
        for mapping in mappings() {
            let source = sources()
                .into_iter()
                .find(|s| s.id == mapping.source_id)
                .unwrap();
            assert_eq!(mapping.check(&source, &destination), Ok(()), "{}", mapping.id);
        }
    }

    #[test]
    fn test_stocks_trade() {
        let (mapping, source, destination) = (revolut_stocks_to_ghostfolio(), revolut_stocks(), ghostfolio());
        let row = record(&[
            ("Date", "2024-03-04T14:31:07.512Z"),
            ("Ticker", "SAP"),
            ("Type", "BUY - MARKET"),
            ("Quantity", "2"),
            ("Price per share", "EUR 172.50"),
            ("Total Amount", "EUR 345"),
            ("Currency", "EUR"),
            ("FX Rate", "1.08"),
        ]);

        let RowOutcome::Converted(out) = Mapper::new(&mapping, &source, &destination).execute(0, &row).outcome else {
            panic!("trade should convert");
        };
        assert_eq!(out.get("date"), Some("2024-03-04"));
        assert_eq!(out.get("symbol"), Some("SAP.DE"));
        assert_eq!(out.get("type"), Some("BUY"));
        assert_eq!(out.get("unitPrice"), Some("172.5"));
        assert_eq!(out.get("fee"), Some("0"));
        assert_eq!(out.get("account"), Some("Revolut"));
    }

    #[test]
    fn test_stocks_cash_top_up_is_skipped() {
        let (mapping, source, destination) = (revolut_stocks_to_ghostfolio(), revolut_stocks(), ghostfolio());
        let row = record(&[("Date", "2024-03-01T09:00:00Z"), ("Ticker", ""), ("Type", "CASH TOP-UP")]);
        let outcome = Mapper::new(&mapping, &source, &destination).execute(0, &row).outcome;
        assert_eq!(outcome, RowOutcome::Skipped);
    }

    #[test]
    fn test_crypto_trade() {
        let (mapping, source, destination) = (revolut_crypto_to_ghostfolio(), revolut_crypto(), ghostfolio());
        let row = record(&[
            ("Symbol", "BTC"),
            ("Type", "Buy"),
            ("Quantity", "0.0015"),
            ("Price", "$42,000.00"),
            ("Value", "$63.00"),
            ("Fees", "$0.95"),
            ("Date", "Jan 5, 2024, 3:04:05 PM"),
        ]);

        let RowOutcome::Converted(out) = Mapper::new(&mapping, &source, &destination).execute(0, &row).outcome else {
            panic!("trade should convert");
        };
        assert_eq!(out.get("date"), Some("2024-01-05"));
        assert_eq!(out.get("symbol"), Some("BTC-USD"));
        assert_eq!(out.get("type"), Some("BUY"));
        assert_eq!(out.get("quantity"), Some("0.0015"));
        assert_eq!(out.get("unitPrice"), Some("42000"));
        assert_eq!(out.get("fee"), Some("0.95"));
    }
}
