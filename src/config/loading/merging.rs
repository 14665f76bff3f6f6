use toml::{Value, map::Map};

/// Table key whose arrays are concatenated across files instead of replaced.
const CONNECTION_KEY: &str = "connection";

/// Merges configuration layers in order; later layers take precedence.
///
/// `[[connection]]` arrays accumulate across layers so drop-in files can add
/// profiles without repeating the ones from the main file.
pub fn merge_toml_layers(layers: Vec<Value>) -> Value {
    let mut accumulated = Value::Table(Map::new());
    let mut connections = Vec::new();

    for mut layer in layers {
        if let Value::Table(table) = &mut layer {
            if let Some(Value::Array(profiles)) = table.remove(CONNECTION_KEY) {
                connections.extend(profiles);
            }
        }
        accumulated = merge_two_toml_configs(accumulated, layer);
    }

    if let Value::Table(table) = &mut accumulated {
        if !connections.is_empty() {
            table.insert(CONNECTION_KEY.to_string(), Value::Array(connections));
        }
    }

    accumulated
}

/// Deep merges two TOML values while preserving precedence
///
/// Overlay tables are merged key by key into base; for non-table values the
/// overlay completely replaces base.
pub fn merge_two_toml_configs(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Table(base_table), Value::Table(overlay_table)) => {
            let mut merged_table = overlay_table;

            for (key, base_value) in base_table {
                match merged_table.remove(&key) {
                    None => {
                        merged_table.insert(key, base_value);
                    }
                    Some(overlay_value) => {
                        let merged_value = merge_two_toml_configs(base_value, overlay_value);
                        merged_table.insert(key, merged_value);
                    }
                }
            }

            Value::Table(merged_table)
        }
        (_, overlay) => overlay,
    }
}
