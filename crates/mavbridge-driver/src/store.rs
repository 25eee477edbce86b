//! 遥测快照存储
//!
//! 字段名 -> 标量值 的映射，整体存放在 `ArcSwap` 中：
//! - 写端（监听线程）每次 `merge` 生成一份新映射并原子替换
//! - 读端（广播器、命令序列器）`snapshot` 拿到的是不可变的 `Arc`
//!
//! 同一次 `merge` 写入的字段组要么全部可见，要么全部不可见。

use arc_swap::ArcSwap;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

type FieldMap = BTreeMap<String, TelemetryValue>;

/// 遥测标量值
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TelemetryValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl TelemetryValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            TelemetryValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// 数值读取（整数也按浮点返回）
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TelemetryValue::Float(v) => Some(*v),
            TelemetryValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            TelemetryValue::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl From<bool> for TelemetryValue {
    fn from(v: bool) -> Self {
        TelemetryValue::Bool(v)
    }
}

impl From<f64> for TelemetryValue {
    fn from(v: f64) -> Self {
        TelemetryValue::Float(v)
    }
}

impl From<f32> for TelemetryValue {
    fn from(v: f32) -> Self {
        TelemetryValue::Float(v as f64)
    }
}

impl From<i64> for TelemetryValue {
    fn from(v: i64) -> Self {
        TelemetryValue::Int(v)
    }
}

impl From<i32> for TelemetryValue {
    fn from(v: i32) -> Self {
        TelemetryValue::Int(v as i64)
    }
}

impl From<u16> for TelemetryValue {
    fn from(v: u16) -> Self {
        TelemetryValue::Int(v as i64)
    }
}

impl From<u8> for TelemetryValue {
    fn from(v: u8) -> Self {
        TelemetryValue::Int(v as i64)
    }
}

impl From<String> for TelemetryValue {
    fn from(v: String) -> Self {
        TelemetryValue::Text(v)
    }
}

impl From<&str> for TelemetryValue {
    fn from(v: &str) -> Self {
        TelemetryValue::Text(v.to_string())
    }
}

/// 某一时刻的遥测快照（不可变）
#[derive(Debug, Clone, Default)]
pub struct TelemetrySnapshot {
    fields: Arc<FieldMap>,
}

impl TelemetrySnapshot {
    pub fn get(&self, field: &str) -> Option<&TelemetryValue> {
        self.fields.get(field)
    }

    pub fn get_bool(&self, field: &str) -> Option<bool> {
        self.get(field).and_then(TelemetryValue::as_bool)
    }

    pub fn get_f64(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(TelemetryValue::as_f64)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(TelemetryValue::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TelemetryValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl Serialize for TelemetrySnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.fields.as_ref().serialize(serializer)
    }
}

/// 遥测存储
#[derive(Debug, Default)]
pub struct TelemetryStore {
    fields: ArcSwap<FieldMap>,
}

impl TelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 原子合并一组字段，其余字段保持不变
    pub fn merge<I, K, V>(&self, fields: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<TelemetryValue>,
    {
        let updates: Vec<(String, TelemetryValue)> =
            fields.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        if updates.is_empty() {
            return;
        }

        // rcu：并发写入时闭包可能被重试，所以 updates 先收集好
        self.fields.rcu(|current| {
            let mut next = FieldMap::clone(current);
            for (key, value) in &updates {
                next.insert(key.clone(), value.clone());
            }
            Arc::new(next)
        });
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            fields: self.fields.load_full(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.load().is_empty()
    }
}

/// 本地 Unix 时间戳（秒）
pub fn unix_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_starts_empty() {
        let store = TelemetryStore::new();
        assert!(store.is_empty());
        assert!(store.snapshot().is_empty());
        // 未上报的字段不存在，而不是 null
        assert!(store.snapshot().get("armed").is_none());
    }

    #[test]
    fn test_merge_leaves_other_fields_untouched() {
        let store = TelemetryStore::new();
        store.merge([("roll", 1.0), ("pitch", 2.0), ("yaw", 3.0)]);
        store.merge([("gps_fix", TelemetryValue::Bool(true))]);
        store.merge([("roll", 5.0)]);

        let snap = store.snapshot();
        assert_eq!(snap.len(), 4);
        assert_eq!(snap.get_f64("roll"), Some(5.0));
        assert_eq!(snap.get_f64("pitch"), Some(2.0));
        assert_eq!(snap.get_bool("gps_fix"), Some(true));
    }

    #[test]
    fn test_snapshot_is_immutable_copy() {
        let store = TelemetryStore::new();
        store.merge([("mode", "GUIDED")]);
        let before = store.snapshot();
        store.merge([("mode", "RTL")]);

        assert_eq!(before.get_str("mode"), Some("GUIDED"));
        assert_eq!(store.snapshot().get_str("mode"), Some("RTL"));
    }

    #[test]
    fn test_typed_getters_reject_wrong_types() {
        let store = TelemetryStore::new();
        store.merge([
            ("armed", TelemetryValue::from(true)),
            ("gps_satellites", TelemetryValue::from(12u8)),
            ("mode", TelemetryValue::from("LOITER")),
        ]);
        let snap = store.snapshot();
        assert_eq!(snap.get_bool("mode"), None);
        assert_eq!(snap.get_str("armed"), None);
        assert_eq!(snap.get_f64("gps_satellites"), Some(12.0));
    }

    #[test]
    fn test_snapshot_serializes_plain_scalars() {
        let store = TelemetryStore::new();
        store.merge([
            ("armed", TelemetryValue::from(false)),
            ("heading", TelemetryValue::from(270i32)),
            ("lat", TelemetryValue::from(47.5)),
            ("mode", TelemetryValue::from("GUIDED")),
        ]);
        let json = serde_json::to_value(store.snapshot()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"armed": false, "heading": 270, "lat": 47.5, "mode": "GUIDED"})
        );
    }

    #[test]
    fn test_empty_merge_is_noop() {
        let store = TelemetryStore::new();
        store.merge(Vec::<(String, TelemetryValue)>::new());
        assert!(store.is_empty());
    }
}
