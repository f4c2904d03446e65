use mhist::{
    errors::Error,
    Measurement,
    Message,
    Pools,
    Store,
};

/// Decode one published line, build a pooled measurement from it and hand it
/// to the store's fanout. The measurement is recycled once every subscriber
/// has seen it.
pub async fn handle_published_line(
    pools: &Pools,
    store: &Store,
    line: &str,
    is_replication: bool,
) -> Result<(), Error> {
    let message: Message = serde_json::from_str(line)?;
    if message.name.is_empty() {
        return Err(Error::MalformedInput("message without a name".to_owned()));
    }
    let measurement = measurement_from_value(pools, message.timestamp, &message.value)?;
    store.add(&message.name, &measurement, is_replication).await;
    pools.put_measurement(measurement);
    Ok(())
}

fn measurement_from_value(
    pools: &Pools,
    ts: i64,
    value: &serde_json::Value,
) -> Result<Measurement, Error> {
    match value {
        serde_json::Value::Number(number) => {
            let number = number.as_f64().ok_or_else(|| {
                Error::MalformedInput(format!("unrepresentable number {number}"))
            })?;
            let mut measurement = pools.get_numerical();
            if let Measurement::Numerical { ts: m_ts, value: m_value } = &mut measurement {
                *m_ts = ts;
                *m_value = number;
            }
            Ok(measurement)
        },
        serde_json::Value::String(string) => {
            // Separators would corrupt the block format (see the CSV layer).
            if string.contains(',') || string.contains('\n') {
                return Err(Error::MalformedInput(format!(
                    "categorical value {string:?} contains a separator"
                )));
            }
            let mut measurement = pools.get_categorical();
            if let Measurement::Categorical { ts: m_ts, value: m_value } = &mut measurement {
                *m_ts = ts;
                m_value.clear();
                m_value.push_str(string);
            }
            Ok(measurement)
        },
        other => Err(Error::MalformedInput(format!(
            "unsupported measurement value {other}"
        ))),
    }
}
