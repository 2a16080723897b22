//! Record / Cursor - 쿼리 결과
//!
//! [`Cursor`] 는 [`QueryResult`] 버퍼에서 한 줄씩 꺼내 하이드레이션한
//! [`Record`] 를 돌려주는 전진 전용 커서입니다.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::bolt::{PackStreamMap, QueryStats};

use super::error::{DriverError, DriverResult};
use super::hydration::Hydrator;
use super::task::{Bookmark, QueryResult};
use super::types::{Node, Path, Relationship, Value};

// ============================================================================
// Record - 단일 레코드
// ============================================================================

/// 쿼리 결과 레코드
///
/// 키 목록은 같은 결과의 레코드끼리 공유합니다.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    keys: Arc<[String]>,
    values: Vec<Value>,
}

/// 키로 꺼내 `$target` 로 변환하는 게터들
macro_rules! typed_getters {
    ($($method:ident => $target:ty),+ $(,)?) => {
        $(
            pub fn $method(&self, key: &str) -> DriverResult<$target> {
                self.get_as::<$target>(key)
            }
        )+
    };
}

impl Record {
    pub fn new(keys: impl Into<Arc<[String]>>, values: Vec<Value>) -> Self {
        Self {
            keys: keys.into(),
            values,
        }
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn index_of(&self, key: &str) -> Option<usize> {
        self.keys.iter().position(|k| k == key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index_of(key).is_some()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.index_of(key).and_then(|i| self.values.get(i))
    }

    pub fn get_by_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// 키의 값을 `T` 로 변환. 없는 키는 에러.
    pub fn get_as<T>(&self, key: &str) -> DriverResult<T>
    where
        T: TryFrom<Value, Error = DriverError>,
    {
        match self.get(key) {
            Some(value) => T::try_from(value.clone()),
            None => Err(DriverError::type_conversion(format!(
                "No column '{}' in record (columns: {})",
                key,
                self.keys.join(", ")
            ))),
        }
    }

    typed_getters! {
        get_bool => bool,
        get_int => i64,
        get_float => f64,
        get_string => String,
        get_node => Node,
        get_relationship => Relationship,
        get_path => Path,
    }

    /// Null 이나 없는 키는 `None`
    pub fn get_optional<T>(&self, key: &str) -> DriverResult<Option<T>>
    where
        T: TryFrom<Value, Error = DriverError>,
    {
        match self.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => T::try_from(value.clone()).map(Some),
        }
    }

    pub fn to_map(&self) -> HashMap<String, Value> {
        self.into_iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<Record")?;
        for (key, value) in self {
            write!(f, " {}={}", key, value)?;
        }
        f.write_str(">")
    }
}

impl<'a> IntoIterator for &'a Record {
    type Item = (&'a String, &'a Value);
    type IntoIter = std::iter::Zip<std::slice::Iter<'a, String>, std::slice::Iter<'a, Value>>;

    fn into_iter(self) -> Self::IntoIter {
        self.keys.iter().zip(self.values.iter())
    }
}

// ============================================================================
// Cursor - 결과 커서
// ============================================================================

/// 전진 전용 결과 커서
///
/// 레코드는 이미 버퍼에 받아 둔 것만 돌려줍니다. 더 받으려면
/// 트랜잭션 안에서 `Connector::pull` 을 호출합니다.
#[derive(Debug, Clone)]
pub struct Cursor {
    result: QueryResult,
    hydrator: Arc<Hydrator>,
    keys: Arc<[String]>,
}

impl Cursor {
    pub(crate) fn new(result: QueryResult, hydrator: Arc<Hydrator>) -> Self {
        let keys: Arc<[String]> = result.fields().into();
        Self { result, hydrator, keys }
    }

    /// 내부 결과 핸들
    pub fn result(&self) -> &QueryResult {
        &self.result
    }

    /// 컬럼 이름
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// 다음 레코드
    pub fn next_record(&mut self) -> DriverResult<Option<Record>> {
        match self.result.take() {
            Some(row) => {
                let values = self.hydrator.hydrate_row(row)?;
                Ok(Some(Record::new(Arc::clone(&self.keys), values)))
            }
            None => Ok(None),
        }
    }

    /// 남은 레코드 전부
    pub fn records(&mut self) -> DriverResult<Vec<Record>> {
        let mut records = Vec::new();
        while let Some(record) = self.next_record()? {
            records.push(record);
        }
        Ok(records)
    }

    /// 레코드가 정확히 하나일 때 그 레코드
    pub fn single(&mut self) -> DriverResult<Record> {
        let mut records = self.records()?;
        if records.len() != 1 {
            return Err(DriverError::type_conversion(format!(
                "Expected single record, got {}",
                records.len()
            )));
        }
        Ok(records.remove(0))
    }

    /// 소비하지 않고 최대 `limit` 개 미리 보기
    pub fn peek(&self, limit: usize) -> DriverResult<Vec<Record>> {
        self.result
            .peek(limit)
            .into_iter()
            .map(|row| {
                let values = self.hydrator.hydrate_row(row)?;
                Ok(Record::new(Arc::clone(&self.keys), values))
            })
            .collect()
    }

    /// RUN 과 PULL/DISCARD 응답 메타데이터를 합친 요약
    pub fn summary(&self) -> PackStreamMap {
        self.result.summary()
    }

    /// 갱신 통계
    pub fn stats(&self) -> QueryStats {
        self.summary()
            .get("stats")
            .and_then(|v| v.as_map())
            .map(QueryStats::from_map)
            .unwrap_or_default()
    }

    /// 자동 커밋 쿼리가 남긴 북마크
    pub fn bookmark(&self) -> Option<Bookmark> {
        self.summary()
            .get("bookmark")
            .and_then(|v| v.as_str())
            .map(Bookmark::from)
    }

    /// 서버에 아직 받을 레코드가 남았는지
    pub fn has_more(&self) -> bool {
        !self.result.complete() && self.result.has_more_records()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_record() -> Record {
        let keys: Vec<String> = vec!["name".into(), "age".into(), "active".into()];
        let values = vec![
            Value::String("Alice".into()),
            Value::Integer(30),
            Value::Boolean(true),
        ];
        Record::new(keys, values)
    }

    #[test]
    fn test_record_get() {
        let record = create_test_record();

        assert_eq!(record.len(), 3);
        assert_eq!(record.get("name"), Some(&Value::String("Alice".into())));
        assert_eq!(record.get("age"), Some(&Value::Integer(30)));
        assert_eq!(record.get("unknown"), None);
        assert_eq!(record.get_by_index(2), Some(&Value::Boolean(true)));
        assert!(record.contains_key("active"));
    }

    #[test]
    fn test_record_get_typed() {
        let record = create_test_record();

        assert_eq!(record.get_string("name").unwrap(), "Alice");
        assert_eq!(record.get_int("age").unwrap(), 30);
        assert!(record.get_bool("active").unwrap());

        assert!(record.get_int("name").is_err());
        assert!(record.get_string("unknown").is_err());
    }

    #[test]
    fn test_record_get_optional() {
        let keys: Vec<String> = vec!["value".into(), "null_value".into()];
        let record = Record::new(keys, vec![Value::Integer(42), Value::Null]);

        assert_eq!(record.get_optional::<i64>("value").unwrap(), Some(42));
        assert_eq!(record.get_optional::<i64>("null_value").unwrap(), None);
        assert_eq!(record.get_optional::<i64>("unknown").unwrap(), None);
    }

    #[test]
    fn test_record_to_map_and_display() {
        let record = create_test_record();
        let map = record.to_map();
        assert_eq!(map.get("age"), Some(&Value::Integer(30)));

        assert_eq!(record.to_string(), "<Record name=\"Alice\" age=30 active=true>");

        let pairs: Vec<_> = (&record).into_iter().collect();
        assert_eq!(pairs[0].0, "name");
    }
}
