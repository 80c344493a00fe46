// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use bodega_ledger::identity::resolve_shopkeeper;
use bodega_ledger::{
    AccountId, CourierId, Engine, NewOrder, OrderId, OrderPatch, OrderStatus, SettlementConfig,
    ShopkeeperId, Snapshot,
};
use clap::Parser;
use csv::{ReaderBuilder, Trim, Writer};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

/// Bodega Ledger - Replay order lifecycle events
///
/// Reads lifecycle events from a CSV file, settles delivered orders and
/// writes the resulting accounts (or ledger entries) to stdout.
#[derive(Parser, Debug)]
#[command(name = "bodega-ledger")]
#[command(about = "Replays order lifecycle CSVs through the settlement ledger", long_about = None)]
struct Args {
    /// Path to CSV file with lifecycle events
    ///
    /// Expected format: type,order,bodega,customer,phone,total,status,courier,points
    /// Example: cargo run -- events.csv > accounts.csv
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// JSON file with settlement parameters
    #[arg(long, value_name = "JSON")]
    config: Option<PathBuf>,

    /// Overrides the flat courier fee
    #[arg(long)]
    base_courier_fee: Option<Decimal>,

    /// Overrides the courier share of the order total (e.g. 0.02)
    #[arg(long)]
    courier_percentage: Option<Decimal>,

    /// Overrides the platform share of the order total (e.g. 0.12)
    #[arg(long)]
    platform_margin: Option<Decimal>,

    /// Snapshot to restore from (if present) and save to afterwards
    #[arg(long, value_name = "JSON")]
    state: Option<PathBuf>,

    /// Print ledger entries instead of accounts
    #[arg(long)]
    ledger: bool,
}

impl Args {
    fn settlement_config(&self) -> Result<SettlementConfig, String> {
        let mut config = match &self.config {
            Some(path) => {
                let file = File::open(path)
                    .map_err(|e| format!("opening config '{}': {}", path.display(), e))?;
                SettlementConfig::from_reader(BufReader::new(file))
                    .map_err(|e| format!("parsing config '{}': {}", path.display(), e))?
            }
            None => SettlementConfig::default(),
        };
        if let Some(fee) = self.base_courier_fee {
            config.base_courier_fee = fee;
        }
        if let Some(percentage) = self.courier_percentage {
            config.courier_percentage = percentage;
        }
        if let Some(percentage) = self.platform_margin {
            config.platform_margin_percentage = percentage;
        }
        config.validate().map_err(|e| format!("invalid config: {}", e))?;
        Ok(config)
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = match args.settlement_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let engine = match load_engine(args.state.as_deref(), config) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Error loading state: {}", e);
            process::exit(1);
        }
    };

    let file = match File::open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error opening file '{}': {}", args.input.display(), e);
            process::exit(1);
        }
    };

    if let Err(e) = process_events(&engine, BufReader::new(file)) {
        eprintln!("Error processing events: {}", e);
        process::exit(1);
    }

    let written = if args.ledger {
        write_ledger(&engine, std::io::stdout())
    } else {
        write_accounts(&engine, std::io::stdout())
    };
    if let Err(e) = written {
        eprintln!("Error writing output: {}", e);
        process::exit(1);
    }

    if let Some(path) = &args.state {
        if let Err(e) = save_engine(&engine, path) {
            eprintln!("Error saving state '{}': {}", path.display(), e);
            process::exit(1);
        }
    }
}

fn load_engine(state: Option<&Path>, config: SettlementConfig) -> Result<Engine, String> {
    let Some(path) = state.filter(|path| path.exists()) else {
        return Ok(Engine::with_config(config));
    };
    let file = File::open(path).map_err(|e| e.to_string())?;
    let snapshot = Snapshot::from_reader(BufReader::new(file)).map_err(|e| e.to_string())?;
    Engine::restore(snapshot, config).map_err(|e| e.to_string())
}

fn save_engine(engine: &Engine, path: &Path) -> Result<(), String> {
    let snapshot = engine.snapshot().map_err(|e| e.to_string())?;
    let file = File::create(path).map_err(|e| e.to_string())?;
    let mut writer = BufWriter::new(file);
    snapshot.to_writer(&mut writer).map_err(|e| e.to_string())?;
    writer.flush().map_err(|e| e.to_string())
}

/// Raw CSV record matching the input format.
///
/// Fields: `type, order, bodega, customer, phone, total, status, courier, points`
#[derive(Debug, Deserialize)]
struct CsvRecord {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    order: String,
    #[serde(default)]
    bodega: String,
    #[serde(default)]
    customer: String,
    #[serde(default)]
    phone: String,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    total: Option<Decimal>,
    #[serde(default)]
    status: String,
    #[serde(default)]
    courier: String,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    points: Option<i64>,
}

/// One replayable lifecycle event.
#[derive(Debug)]
enum Event {
    Place(NewOrder),
    Update(OrderId, OrderPatch),
    Redeem(ShopkeeperId, i64),
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

impl CsvRecord {
    /// Converts CSV record to an [`Event`].
    ///
    /// Returns `None` for unknown event types, unknown statuses or missing required fields.
    fn into_event(self) -> Option<Event> {
        match self.event_type.to_lowercase().as_str() {
            "place" => {
                let order = non_empty(self.order)?;
                let bodega = non_empty(self.bodega)?;
                let mut new_order = NewOrder::new(order, bodega);
                new_order.total = self.total;
                new_order.customer_name = non_empty(self.customer);
                new_order.customer_phone = non_empty(self.phone);
                Some(Event::Place(new_order))
            }
            "update" => {
                let order = non_empty(self.order)?;
                let mut patch = OrderPatch::default();
                if let Some(status) = non_empty(self.status) {
                    patch.status = Some(status.parse::<OrderStatus>().ok()?);
                }
                patch.courier_id = non_empty(self.courier).map(CourierId);
                Some(Event::Update(OrderId::new(order), patch))
            }
            "redeem" => {
                let shopkeeper = resolve_shopkeeper(Some(&self.phone), Some(&self.customer))?;
                Some(Event::Redeem(shopkeeper, self.points?))
            }
            _ => None,
        }
    }
}

/// Replays lifecycle events from a CSV reader into `engine`.
///
/// Malformed rows and rejected events are logged and skipped; processing
/// continues with the next row.
///
/// # CSV Format
///
/// ```csv
/// type,order,bodega,customer,phone,total,status,courier,points
/// place,P1,B1,Ana,300 555 1234,37000,,,
/// update,P1,,,,,confirmed,,
/// update,P1,,,,,assigned,C1,
/// redeem,,,,300 555 1234,,,,10
/// ```
///
/// # Errors
///
/// Returns a CSV error if the header cannot be read.
pub fn process_events<R: Read>(engine: &Engine, reader: R) -> Result<usize, csv::Error> {
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);
    rdr.headers()?;

    let mut applied = 0;
    for (row, result) in rdr.deserialize::<CsvRecord>().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(row, error = %e, "skipping malformed row");
                continue;
            }
        };
        let Some(event) = record.into_event() else {
            tracing::warn!(row, "skipping invalid event");
            continue;
        };

        let outcome = match event {
            Event::Place(new_order) => engine.place_order(new_order).map(drop),
            Event::Update(order_id, patch) => engine.update_order(&order_id, patch).map(drop),
            Event::Redeem(shopkeeper_id, points) => engine.redeem(&shopkeeper_id, points).map(drop),
        };
        match outcome {
            Ok(()) => applied += 1,
            Err(e) => tracing::warn!(row, error = %e, "event rejected"),
        }
    }

    Ok(applied)
}

/// Output row for one account.
#[derive(Debug, Serialize)]
struct AccountRow {
    account: String,
    kind: String,
    points: i64,
    earnings: Decimal,
}

/// Writes account balances as CSV, sorted by kind then id.
///
/// # CSV Format
///
/// ```csv
/// account,kind,points,earnings
/// 3005551234,shopkeeper,37,0
/// C1,courier,0,5740
/// ```
pub fn write_accounts<W: Write>(engine: &Engine, writer: W) -> Result<(), csv::Error> {
    let mut accounts: Vec<(AccountId, AccountRow)> = engine
        .accounts()
        .map(|account| {
            let id = account.key().clone();
            let row = AccountRow {
                account: id.as_str().to_string(),
                kind: id.kind().to_string(),
                points: account.points(),
                earnings: account.earnings().round_dp(2),
            };
            (id, row)
        })
        .collect();
    accounts.sort_by(|a, b| a.0.cmp(&b.0));

    let mut wtr = Writer::from_writer(writer);
    for (_, row) in &accounts {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Writes every ledger entry as CSV, oldest first.
pub fn write_ledger<W: Write>(engine: &Engine, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);
    for entry in engine.ledger_entries() {
        wtr.serialize(&entry)?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Cursor;

    const HEADER: &str = "type,order,bodega,customer,phone,total,status,courier,points\n";

    fn replay(rows: &str) -> Engine {
        let engine = Engine::new();
        process_events(&engine, Cursor::new(format!("{HEADER}{rows}"))).unwrap();
        engine
    }

    const DELIVERY: &str = "place,P1,B1,Ana,300 555 1234,37000,,,\n\
                            update,P1,,,,,confirmed,,\n\
                            update,P1,,,,,assigned,C1,\n\
                            update,P1,,,,,at_warehouse,,\n\
                            update,P1,,,,,picked_up,,\n\
                            update,P1,,,,,in_transit,,\n\
                            update,P1,,,,,delivered,,\n";

    #[test]
    fn full_delivery_is_settled() {
        let engine = replay(DELIVERY);

        let entry = engine.ledger_entry(&OrderId::from("P1")).unwrap();
        assert_eq!(entry.loyalty_points, 37);
        assert_eq!(entry.courier_earning, dec!(5740));
        assert_eq!(engine.balance(&ShopkeeperId::from("3005551234"), None), 37);
    }

    #[test]
    fn redeem_row_spends_points() {
        let engine = replay(&format!("{DELIVERY}redeem,,,,3005551234,,,,30\n"));
        assert_eq!(engine.balance(&ShopkeeperId::from("3005551234"), None), 7);
    }

    #[test]
    fn rejected_events_are_skipped() {
        let engine = Engine::new();
        let csv = format!(
            "{HEADER}place,P1,B1,Ana,,1000,,,\n\
             update,P1,,,,,assigned,C1,\n\
             update,P1,,,,,teleported,,\n\
             bogus,row\n\
             update,P1,,,,,confirmed,,\n"
        );
        let applied = process_events(&engine, Cursor::new(csv)).unwrap();

        assert_eq!(applied, 2);
        assert_eq!(
            engine.order(&OrderId::from("P1")).unwrap().status,
            OrderStatus::Confirmed
        );
    }

    #[test]
    fn whitespace_is_trimmed() {
        let engine = replay(" place , P1 , B1 , Ana , , 500 , , , \n");
        assert!(engine.order(&OrderId::from("P1")).is_ok());
    }

    #[test]
    fn write_accounts_to_csv() {
        let engine = replay(DELIVERY);
        let mut output = Vec::new();
        write_accounts(&engine, &mut output).unwrap();

        let output = String::from_utf8(output).unwrap();
        let lines: Vec<_> = output.lines().collect();
        assert_eq!(lines[0], "account,kind,points,earnings");
        assert_eq!(lines[1], "3005551234,shopkeeper,37,0");
        assert_eq!(lines[2], "C1,courier,0,5740");
    }

    #[test]
    fn write_ledger_to_csv() {
        let engine = replay(DELIVERY);
        let mut output = Vec::new();
        write_ledger(&engine, &mut output).unwrap();

        let output = String::from_utf8(output).unwrap();
        assert!(output.starts_with("id,pedidoId,bodegaId,courierId,shopkeeperId"));
        assert!(output.contains(",P1,B1,C1,3005551234,37000,37,5740,4440,"));
    }

    #[test]
    fn config_overrides_apply() {
        let args = Args::parse_from(["bodega-ledger", "events.csv", "--base-courier-fee", "6000"]);
        let config = args.settlement_config().unwrap();
        assert_eq!(config.base_courier_fee, dec!(6000));
        assert_eq!(config.courier_percentage, dec!(0.02));
    }

    #[test]
    fn state_round_trips_through_snapshot() {
        let engine = replay(DELIVERY);
        let mut buffer = Vec::new();
        engine.snapshot().unwrap().to_writer(&mut buffer).unwrap();

        let snapshot = Snapshot::from_reader(buffer.as_slice()).unwrap();
        let restored = Engine::restore(snapshot, SettlementConfig::default()).unwrap();
        assert_eq!(restored.balance(&ShopkeeperId::from("3005551234"), None), 37);
        assert_eq!(
            restored
                .courier_earnings_summary(&CourierId::from("C1"), &Default::default())
                .earnings,
            dec!(5740)
        );
    }
}
