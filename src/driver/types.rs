//! Driver Types
//!
//! 하이드레이션을 거친 값 모델. 와이어 값([`PackStreamValue`])과의 변환은
//! [`super::hydration::Hydrator`] 가 담당합니다.
//!
//! [`PackStreamValue`]: crate::bolt::PackStreamValue

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use super::error::{DriverError, DriverResult};

// ============================================================================
// Value - 그래프 값
// ============================================================================

/// 그래프 값 타입
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Null
    Null,
    /// Boolean
    Boolean(bool),
    /// Integer (i64)
    Integer(i64),
    /// Float (f64)
    Float(f64),
    /// String
    String(String),
    /// Bytes
    Bytes(Vec<u8>),
    /// List
    List(Vec<Value>),
    /// Map
    Map(HashMap<String, Value>),
    /// Node
    Node(Node),
    /// Relationship
    Relationship(Relationship),
    /// Path
    Path(Path),
    /// Point (2D/3D)
    Point(Point),
    /// Date
    Date(NaiveDate),
    /// Time (UTC 오프셋 포함)
    Time(Time),
    /// LocalTime
    LocalTime(NaiveTime),
    /// DateTime (고정 오프셋)
    DateTime(DateTime<FixedOffset>),
    /// DateTime (타임존 ID)
    ZonedDateTime(ZonedDateTime),
    /// LocalDateTime
    LocalDateTime(NaiveDateTime),
    /// Duration
    Duration(Duration),
    /// 하이드레이터에 등록되지 않은 구조체
    Structure(Structure),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Value::Boolean(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match *self {
            Value::Integer(i) => Some(i),
            _ => None,
        }
    }

    /// Float, 또는 Integer 를 f64 로 넓힌 값
    pub fn as_float(&self) -> Option<f64> {
        match *self {
            Value::Float(f) => Some(f),
            Value::Integer(i) => Some(i as f64),
            _ => None,
        }
    }

    /// 변형 이름 (에러 메시지용)
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Boolean(_) => "Boolean",
            Value::Integer(_) => "Integer",
            Value::Float(_) => "Float",
            Value::String(_) => "String",
            Value::Bytes(_) => "Bytes",
            Value::List(_) => "List",
            Value::Map(_) => "Map",
            Value::Node(_) => "Node",
            Value::Relationship(_) => "Relationship",
            Value::Path(_) => "Path",
            Value::Point(_) => "Point",
            Value::Date(_) => "Date",
            Value::Time(_) => "Time",
            Value::LocalTime(_) => "LocalTime",
            Value::DateTime(_) => "DateTime",
            Value::ZonedDateTime(_) => "ZonedDateTime",
            Value::LocalDateTime(_) => "LocalDateTime",
            Value::Duration(_) => "Duration",
            Value::Structure(_) => "Structure",
        }
    }
}

/// 변형 하나를 빌려 보는 `as_*` 접근자
macro_rules! impl_value_refs {
    ($($method:ident => $variant:ident: $target:ty),+ $(,)?) => {
        impl Value {
            $(
                #[doc = concat!("`", stringify!($variant), "` 이면 참조")]
                pub fn $method(&self) -> Option<&$target> {
                    match self {
                        Value::$variant(v) => Some(v),
                        _ => None,
                    }
                }
            )+
        }
    };
}

impl_value_refs! {
    as_str => String: str,
    as_bytes => Bytes: [u8],
    as_list => List: [Value],
    as_map => Map: HashMap<String, Value>,
    as_node => Node: Node,
    as_relationship => Relationship: Relationship,
    as_path => Path: Path,
    as_point => Point: Point,
    as_duration => Duration: Duration,
    as_structure => Structure: Structure,
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Value::Map(entries) => {
                let mut keys: Vec<&String> = entries.keys().collect();
                keys.sort();
                f.write_str("{")?;
                for (i, key) in keys.into_iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", key, entries[key])?;
                }
                f.write_str("}")
            }
            Value::Node(n) => write!(f, "{}", n),
            Value::Relationship(r) => write!(f, "{}", r),
            Value::Path(p) => write!(f, "{}", p),
            Value::Point(p) => write!(f, "{}", p),
            Value::Date(d) => write!(f, "{}", d),
            Value::Time(t) => write!(f, "{}", t),
            Value::LocalTime(t) => write!(f, "{}", t),
            Value::DateTime(dt) => f.write_str(&dt.to_rfc3339()),
            Value::ZonedDateTime(dt) => write!(f, "{}", dt),
            Value::LocalDateTime(dt) => write!(f, "{}", dt),
            Value::Duration(d) => write!(f, "{}", d),
            Value::Structure(s) => write!(f, "{}", s),
        }
    }
}

// ============================================================================
// From implementations
// ============================================================================

macro_rules! impl_value_from {
    ($($source:ty => $variant:ident),+ $(,)?) => {
        $(
            impl From<$source> for Value {
                fn from(v: $source) -> Self {
                    Value::$variant(v)
                }
            }
        )+
    };
}

impl_value_from! {
    bool => Boolean,
    i64 => Integer,
    f64 => Float,
    String => String,
    HashMap<String, Value> => Map,
    Node => Node,
    Relationship => Relationship,
    Path => Path,
    Point => Point,
    NaiveDate => Date,
    Time => Time,
    NaiveTime => LocalTime,
    DateTime<FixedOffset> => DateTime,
    ZonedDateTime => ZonedDateTime,
    NaiveDateTime => LocalDateTime,
    Duration => Duration,
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

// ============================================================================
// Graph entities
// ============================================================================

/// 속성을 가진 그래프 요소 (노드, 관계)
pub trait Entity {
    /// 서버가 부여한 ID
    fn id(&self) -> i64;

    fn properties(&self) -> &HashMap<String, Value>;

    fn get(&self, key: &str) -> Option<&Value> {
        self.properties().get(key)
    }

    /// 속성을 `T` 로 변환해 가져옴. 없는 속성은 에러.
    fn get_as<T: TryFrom<Value, Error = DriverError>>(&self, key: &str) -> DriverResult<T> {
        match self.get(key) {
            Some(value) => T::try_from(value.clone()),
            None => Err(DriverError::type_conversion(format!(
                "Entity {} has no property '{}'",
                self.id(),
                key
            ))),
        }
    }
}

/// 그래프 노드
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: i64,
    pub labels: Vec<String>,
    pub properties: HashMap<String, Value>,
}

impl Node {
    pub fn new(id: i64, labels: Vec<String>, properties: HashMap<String, Value>) -> Self {
        Self { id, labels, properties }
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}

impl Entity for Node {
    fn id(&self) -> i64 {
        self.id
    }

    fn properties(&self) -> &HashMap<String, Value> {
        &self.properties
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}", self.id)?;
        for label in &self.labels {
            write!(f, ":{}", label)?;
        }
        f.write_str(")")
    }
}

/// 방향이 있는 관계
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: i64,
    pub start_node_id: i64,
    pub end_node_id: i64,
    #[serde(rename = "type")]
    pub rel_type: String,
    pub properties: HashMap<String, Value>,
}

impl Relationship {
    pub fn new(
        id: i64,
        start_node_id: i64,
        end_node_id: i64,
        rel_type: String,
        properties: HashMap<String, Value>,
    ) -> Self {
        Self {
            id,
            start_node_id,
            end_node_id,
            rel_type,
            properties,
        }
    }

    /// `node_id` 반대편 끝
    pub fn other_node_id(&self, node_id: i64) -> Option<i64> {
        if node_id == self.start_node_id {
            Some(self.end_node_id)
        } else if node_id == self.end_node_id {
            Some(self.start_node_id)
        } else {
            None
        }
    }
}

impl Entity for Relationship {
    fn id(&self) -> i64 {
        self.id
    }

    fn properties(&self) -> &HashMap<String, Value> {
        &self.properties
    }
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({})-[{}:{}]->({})",
            self.start_node_id, self.id, self.rel_type, self.end_node_id
        )
    }
}

/// 끝점이 없는 관계. 경로 안에서만 나타납니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnboundRelationship {
    pub id: i64,
    #[serde(rename = "type")]
    pub rel_type: String,
    pub properties: HashMap<String, Value>,
}

impl UnboundRelationship {
    /// 두 노드 사이에 묶기
    pub fn bind(self, start_node_id: i64, end_node_id: i64) -> Relationship {
        Relationship::new(self.id, start_node_id, end_node_id, self.rel_type, self.properties)
    }
}

/// 그래프 경로
///
/// `nodes.len() == relationships.len() + 1` 이고, `relationships[i]` 는
/// `nodes[i]` 와 `nodes[i + 1]` 을 잇습니다 (방향은 관계 자체가 가짐).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Path {
    pub nodes: Vec<Node>,
    pub relationships: Vec<Relationship>,
}

impl Path {
    pub fn new(nodes: Vec<Node>, relationships: Vec<Relationship>) -> Self {
        Self { nodes, relationships }
    }

    /// 관계 수
    pub fn len(&self) -> usize {
        self.relationships.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relationships.is_empty()
    }

    pub fn start(&self) -> Option<&Node> {
        self.nodes.first()
    }

    pub fn end(&self) -> Option<&Node> {
        self.nodes.last()
    }

    /// `(앞 노드, 관계, 뒤 노드)` 순회
    pub fn segments(&self) -> impl Iterator<Item = (&Node, &Relationship, &Node)> {
        self.relationships
            .iter()
            .zip(self.nodes.windows(2))
            .map(|(rel, pair)| (&pair[0], rel, &pair[1]))
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.start() {
            Some(start) => write!(f, "{}", start)?,
            None => return f.write_str("<empty path>"),
        }
        for (prev, rel, next) in self.segments() {
            if rel.start_node_id == prev.id {
                write!(f, "-[:{}]->{}", rel.rel_type, next)?;
            } else {
                write!(f, "<-[:{}]-{}", rel.rel_type, next)?;
            }
        }
        Ok(())
    }
}

// ============================================================================
// Point - 공간 좌표
// ============================================================================

/// Cartesian 2D SRID
pub const SRID_CARTESIAN_2D: i32 = 7203;
/// Cartesian 3D SRID
pub const SRID_CARTESIAN_3D: i32 = 9157;
/// WGS84 2D SRID
pub const SRID_WGS84_2D: i32 = 4326;
/// WGS84 3D SRID
pub const SRID_WGS84_3D: i32 = 4979;

/// 공간 좌표
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// SRID (Spatial Reference ID)
    pub srid: i32,
    /// X 좌표 (경도)
    pub x: f64,
    /// Y 좌표 (위도)
    pub y: f64,
    /// Z 좌표 (고도, 선택적)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
}

impl Point {
    /// 2D 포인트 생성
    pub fn new_2d(srid: i32, x: f64, y: f64) -> Self {
        Self { srid, x, y, z: None }
    }

    /// 3D 포인트 생성
    pub fn new_3d(srid: i32, x: f64, y: f64, z: f64) -> Self {
        Self { srid, x, y, z: Some(z) }
    }

    /// WGS84 2D 포인트 (경도, 위도)
    pub fn wgs84_2d(longitude: f64, latitude: f64) -> Self {
        Self::new_2d(SRID_WGS84_2D, longitude, latitude)
    }

    /// WGS84 3D 포인트 (경도, 위도, 고도)
    pub fn wgs84_3d(longitude: f64, latitude: f64, height: f64) -> Self {
        Self::new_3d(SRID_WGS84_3D, longitude, latitude, height)
    }

    /// Cartesian 2D 포인트
    pub fn cartesian_2d(x: f64, y: f64) -> Self {
        Self::new_2d(SRID_CARTESIAN_2D, x, y)
    }

    /// Cartesian 3D 포인트
    pub fn cartesian_3d(x: f64, y: f64, z: f64) -> Self {
        Self::new_3d(SRID_CARTESIAN_3D, x, y, z)
    }

    /// 3D 여부
    pub fn is_3d(&self) -> bool {
        self.z.is_some()
    }

    /// 알려진 SRID 가 요구하는 좌표 수. 모르는 SRID 면 `None`.
    pub fn dimensions_for(srid: i32) -> Option<usize> {
        match srid {
            SRID_CARTESIAN_2D | SRID_WGS84_2D => Some(2),
            SRID_CARTESIAN_3D | SRID_WGS84_3D => Some(3),
            _ => None,
        }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.z {
            Some(z) => write!(f, "Point(srid={}, x={}, y={}, z={})", self.srid, self.x, self.y, z),
            None => write!(f, "Point(srid={}, x={}, y={})", self.srid, self.x, self.y),
        }
    }
}

// ============================================================================
// Temporal - 시간 값
// ============================================================================

/// UTC 오프셋이 붙은 시각
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Time {
    /// 현지 시각
    pub time: NaiveTime,
    /// UTC 오프셋 (초)
    pub offset_seconds: i32,
}

impl Time {
    /// 새 Time 생성
    pub fn new(time: NaiveTime, offset_seconds: i32) -> Self {
        Self { time, offset_seconds }
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match FixedOffset::east_opt(self.offset_seconds) {
            Some(offset) => write!(f, "{}{}", self.time, offset),
            None => write!(f, "{}{:+}s", self.time, self.offset_seconds),
        }
    }
}

/// 타임존 ID 가 붙은 현지 일시
///
/// 타임존 데이터베이스를 싣지 않으므로 ID 를 그대로 보존합니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZonedDateTime {
    /// 현지 일시
    pub local: NaiveDateTime,
    /// IANA 타임존 ID (예: `Europe/Stockholm`)
    pub zone_id: String,
}

impl ZonedDateTime {
    /// 새 ZonedDateTime 생성
    pub fn new(local: NaiveDateTime, zone_id: impl Into<String>) -> Self {
        Self {
            local,
            zone_id: zone_id.into(),
        }
    }
}

impl fmt::Display for ZonedDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.local, self.zone_id)
    }
}

// ============================================================================
// Duration - 시간 간격
// ============================================================================

/// 시간 간격
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Duration {
    /// 개월
    pub months: i64,
    /// 일
    pub days: i64,
    /// 초
    pub seconds: i64,
    /// 나노초
    pub nanoseconds: i32,
}

impl Duration {
    /// 새 Duration 생성
    pub fn new(months: i64, days: i64, seconds: i64, nanoseconds: i32) -> Self {
        Self {
            months,
            days,
            seconds,
            nanoseconds,
        }
    }

    /// 개월과 일이 없는 간격은 고정 길이로 바꿀 수 있음
    pub fn to_std(&self) -> Option<std::time::Duration> {
        if self.months != 0 || self.days != 0 || self.seconds < 0 || self.nanoseconds < 0 {
            return None;
        }
        let seconds = u64::try_from(self.seconds).ok()?;
        let nanos = u32::try_from(self.nanoseconds).ok()?;
        Some(std::time::Duration::new(seconds, nanos))
    }
}

impl From<std::time::Duration> for Duration {
    fn from(d: std::time::Duration) -> Self {
        let seconds = i64::try_from(d.as_secs()).unwrap_or(i64::MAX);
        Self::new(0, 0, seconds, d.subsec_nanos() as i32)
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "P{}M{}DT{}S",
            self.months,
            self.days,
            self.seconds as f64 + self.nanoseconds as f64 / 1_000_000_000.0
        )
    }
}

// ============================================================================
// Structure - 알 수 없는 구조체
// ============================================================================

/// 등록된 디코더가 없는 구조체. 필드는 하이드레이션된 상태입니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Structure {
    /// 태그 바이트
    pub tag: u8,
    /// 필드
    pub fields: Vec<Value>,
}

impl fmt::Display for Structure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Structure<0x{:02X}>({} fields)", self.tag, self.fields.len())
    }
}

// ============================================================================
// TryFrom implementations
// ============================================================================

macro_rules! impl_try_from_value {
    ($target:ty, $name:literal, $($pattern:pat => $out:expr),+ $(,)?) => {
        impl TryFrom<Value> for $target {
            type Error = DriverError;

            fn try_from(value: Value) -> Result<Self, Self::Error> {
                match value {
                    $($pattern => Ok($out),)+
                    other => Err(DriverError::type_conversion(format!(
                        "Cannot convert {} to {}",
                        other.type_name(),
                        $name
                    ))),
                }
            }
        }
    };
}

impl_try_from_value!(bool, "bool", Value::Boolean(b) => b);
impl_try_from_value!(i64, "i64", Value::Integer(i) => i);
impl_try_from_value!(f64, "f64", Value::Float(f) => f, Value::Integer(i) => i as f64);
impl_try_from_value!(String, "String", Value::String(s) => s);
impl_try_from_value!(Node, "Node", Value::Node(n) => n);
impl_try_from_value!(Relationship, "Relationship", Value::Relationship(r) => r);
impl_try_from_value!(Path, "Path", Value::Path(p) => p);
impl_try_from_value!(Point, "Point", Value::Point(p) => p);
impl_try_from_value!(Vec<u8>, "Bytes", Value::Bytes(b) => b);
impl_try_from_value!(Vec<Value>, "List", Value::List(l) => l);
impl_try_from_value!(HashMap<String, Value>, "Map", Value::Map(m) => m);
impl_try_from_value!(NaiveDate, "Date", Value::Date(d) => d);
impl_try_from_value!(Time, "Time", Value::Time(t) => t);
impl_try_from_value!(NaiveTime, "LocalTime", Value::LocalTime(t) => t);
impl_try_from_value!(DateTime<FixedOffset>, "DateTime", Value::DateTime(dt) => dt);
impl_try_from_value!(ZonedDateTime, "ZonedDateTime", Value::ZonedDateTime(dt) => dt);
impl_try_from_value!(NaiveDateTime, "LocalDateTime", Value::LocalDateTime(dt) => dt);
impl_try_from_value!(Duration, "Duration", Value::Duration(d) => d);

// ============================================================================
// Tests
// ============================================================================
