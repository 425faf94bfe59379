//! Deterministic last-wins merge for layered config maps.

use model::ConfigMap;
use serde_json::Value;

/// Merge `overlay` into `base`, overlay winning.
///
/// Objects merge key by key, recursively; every other value type
/// (including arrays) overwrites wholesale. Applying layers in
/// precedence order therefore reproduces the left-to-right merge the
/// trading process performs on its `--config` file chain.
pub fn merge_into(base: &mut ConfigMap, overlay: &ConfigMap) {
    for (key, overlay_value) in overlay {
        match (base.get_mut(key), overlay_value) {
            (Some(Value::Object(base_obj)), Value::Object(overlay_obj)) => {
                merge_into(base_obj, overlay_obj);
            }
            _ => {
                base.insert(key.clone(), overlay_value.clone());
            }
        }
    }
}

/// Merge a sequence of layers, later layers winning.
pub fn merge_layers<'a>(layers: impl IntoIterator<Item = &'a ConfigMap>) -> ConfigMap {
    let mut merged = ConfigMap::new();
    for layer in layers {
        merge_into(&mut merged, layer);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(raw: &str) -> ConfigMap {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn test_scalar_overwrite() {
        let mut base = map(r#"{"max_open_trades": 3, "dry_run": true}"#);
        merge_into(&mut base, &map(r#"{"max_open_trades": 10}"#));

        assert_eq!(base["max_open_trades"], 10);
        assert_eq!(base["dry_run"], true);
    }

    #[test]
    fn test_nested_objects_merge_key_by_key() {
        let mut base = map(r#"{"exchange": {"name": "binance", "rate_limit": 200}}"#);
        merge_into(&mut base, &map(r#"{"exchange": {"rate_limit": 50}}"#));

        assert_eq!(base["exchange"]["name"], "binance");
        assert_eq!(base["exchange"]["rate_limit"], 50);
    }

    #[test]
    fn test_arrays_overwrite_wholesale() {
        let mut base = map(r#"{"pair_whitelist": ["BTC/USDT", "ETH/USDT"]}"#);
        merge_into(&mut base, &map(r#"{"pair_whitelist": ["SOL/USDT"]}"#));

        assert_eq!(base["pair_whitelist"], serde_json::json!(["SOL/USDT"]));
    }

    #[test]
    fn test_secure_layer_wins_over_tenant_layers() {
        let exchange = map(r#"{"api_server": {"enabled": false}, "exchange": {"name": "kraken"}}"#);
        let bot = map(r#"{"api_server": {"listen_port": 9999}}"#);
        let secure = map(
            r#"{"api_server": {"enabled": true, "listen_ip_address": "0.0.0.0", "listen_port": 8080}}"#,
        );

        let merged = merge_layers([&exchange, &bot, &secure]);

        assert_eq!(merged["api_server"]["enabled"], true);
        assert_eq!(merged["api_server"]["listen_port"], 8080);
        assert_eq!(merged["api_server"]["listen_ip_address"], "0.0.0.0");
        assert_eq!(merged["exchange"]["name"], "kraken");
    }

    #[test]
    fn test_object_replaces_scalar() {
        let mut base = map(r#"{"stake_amount": 100}"#);
        merge_into(&mut base, &map(r#"{"stake_amount": {"mode": "unlimited"}}"#));

        assert_eq!(base["stake_amount"]["mode"], "unlimited");
    }
}
