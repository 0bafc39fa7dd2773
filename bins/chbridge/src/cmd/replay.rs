use chbridge_api::{CodecError, Query, map_type};
use chbridge_engine::{BridgeConfig, InsertSession, MemoryTransport, ResultCursor};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::error::CliError;
use super::fixture::{Fixture, to_datum, to_json};
use crate::ReplayArgs;

pub async fn run(config: BridgeConfig, args: &ReplayArgs) -> Result<(), CliError> {
    let content = std::fs::read_to_string(&args.fixture)?;
    let fixture = Fixture::parse(&content)?;

    tracing::info!(
        fixture = %args.fixture,
        table = %fixture.table,
        columns = fixture.columns.len(),
        batches = fixture.batches.len(),
        "replaying fixture"
    );

    let token = CancellationToken::new();
    let worker_token = token.clone();
    let mut handle = tokio::task::spawn_blocking(move || replay(&fixture, &config, &worker_token));

    let joined = tokio::select! {
        res = &mut handle => res,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("interrupted, canceling replay");
            token.cancel();
            handle.await
        }
    };
    let rows = joined.map_err(|e| CliError::Task(e.to_string()))??;

    for row in &rows {
        println!("{}", Value::Array(row.clone()));
    }
    tracing::info!(rows = rows.len(), "replay complete");
    Ok(())
}

/// Write every fixture batch through an insert session, then read the sent
/// blocks back through a result cursor.
pub fn replay(
    fixture: &Fixture,
    config: &BridgeConfig,
    token: &CancellationToken,
) -> Result<Vec<Vec<Value>>, CliError> {
    let mut transport = MemoryTransport::new();
    transport.set_insert_target(fixture.target()?);

    let declared = fixture
        .columns
        .iter()
        .map(|c| map_type(&c.ty))
        .collect::<Result<Vec<_>, _>>()?;

    let statement = format!("INSERT INTO {}", fixture.table);
    {
        let mut session =
            InsertSession::open_mapped(&mut transport, &statement, config.insert_options())?;
        for (n, batch) in fixture.batches.iter().enumerate() {
            if token.is_cancelled() {
                return Err(CodecError::Canceled.into());
            }
            for row in batch {
                if row.len() != declared.len() {
                    return Err(CliError::Fixture(format!(
                        "batch {n}: row has {} values, expected {}",
                        row.len(),
                        declared.len()
                    )));
                }
                let values = row
                    .iter()
                    .zip(&declared)
                    .map(|(v, ty)| to_datum(v, ty))
                    .collect::<Result<Vec<_>, _>>()?;
                session.append_row(&values)?;
            }
            session.flush()?;
        }
        session.close()?;
        tracing::debug!(rows = session.sent_rows(), "insert finished");
    }

    let sent = transport.take_sent();
    tracing::debug!(blocks = sent.len(), "reading back");
    transport.push_result(sent);

    let query = Query::new(format!("SELECT * FROM {}", fixture.table))
        .with_settings(config.query_settings());
    let mut cursor = ResultCursor::open(&mut transport, &query, token);
    let mut rows = Vec::new();
    while let Some(cells) = cursor.advance()? {
        rows.push(cells.iter().map(to_json).collect());
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fixture(json: &str) -> Fixture {
        Fixture::parse(json).unwrap()
    }

    #[test]
    fn replays_batches_in_order() {
        let f = fixture(
            r#"{"table": "events",
                "columns": [
                    {"name": "id", "type": "UInt64"},
                    {"name": "kind", "type": "LowCardinality(String)"},
                    {"name": "at", "type": "Nullable(DateTime64(3))"}
                ],
                "batches": [
                    [[1, "open", "2024-03-01 10:00:00.125"], [2, "close", null]],
                    [],
                    [[3, "open", "2024-03-02 00:00:00"]]
                ]}"#,
        );
        let rows = replay(&f, &BridgeConfig::default(), &CancellationToken::new()).unwrap();
        assert_eq!(
            rows,
            vec![
                vec![json!(1), json!("open"), json!("2024-03-01 10:00:00.125000")],
                vec![json!(2), json!("close"), json!(null)],
                vec![json!(3), json!("open"), json!("2024-03-02 00:00:00")],
            ]
        );
    }

    #[test]
    fn replays_bundled_fixture() {
        let f = fixture(include_str!("../../fixtures/trades.json"));
        let config = BridgeConfig::parse(include_str!("../../chbridge.toml")).unwrap();
        let rows = replay(&f, &config, &CancellationToken::new()).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0][2], json!("buy"));
        assert_eq!(rows[0][4], json!("2024-05-01 12:00:00.000125"));
        assert_eq!(rows[1][5], json!(null));
        assert_eq!(rows[2][6], json!(["taker", null]));
    }

    #[test]
    fn block_limit_does_not_change_rows() {
        let f = fixture(
            r#"{"columns": [{"name": "n", "type": "Int32"}],
                "batches": [[[1], [2], [3], [4], [5]]]}"#,
        );
        let config = BridgeConfig::parse("[insert]\nmax_block_rows = 2\n").unwrap();
        let rows = replay(&f, &config, &CancellationToken::new()).unwrap();
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[4], vec![json!(5)]);
    }

    #[test]
    fn out_of_range_value_fails() {
        let f = fixture(
            r#"{"columns": [{"name": "n", "type": "UInt8"}],
                "batches": [[[300]]]}"#,
        );
        let err = replay(&f, &BridgeConfig::default(), &CancellationToken::new()).unwrap_err();
        assert!(matches!(err, CliError::Codec(CodecError::Overflow { .. })), "{err}");
    }

    #[test]
    fn short_row_fails() {
        let f = fixture(
            r#"{"columns": [{"name": "a", "type": "Int32"}, {"name": "b", "type": "String"}],
                "batches": [[[1]]]}"#,
        );
        let err = replay(&f, &BridgeConfig::default(), &CancellationToken::new()).unwrap_err();
        assert!(matches!(err, CliError::Fixture(_)));
    }

    #[test]
    fn canceled_replay_stops() {
        let f = fixture(
            r#"{"columns": [{"name": "a", "type": "Int32"}],
                "batches": [[[1]]]}"#,
        );
        let token = CancellationToken::new();
        token.cancel();
        let err = replay(&f, &BridgeConfig::default(), &token).unwrap_err();
        assert!(matches!(err, CliError::Codec(CodecError::Canceled)));
    }
}
