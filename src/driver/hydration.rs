//! 구조체 하이드레이션
//!
//! 와이어 값([`PackStreamValue`])을 [`Value`] 로, 또는 그 반대로 바꿉니다.
//! 태그별 디코더는 [`Hydrator`] 테이블에 등록되며, 등록되지 않은 태그의
//! 구조체는 [`Value::Structure`] 로 그대로 전달됩니다.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{
    DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike,
};

use crate::bolt::packstream::tag;
use crate::bolt::{PackStreamMap, PackStreamStructure, PackStreamValue};

use super::error::{DriverError, DriverResult};
use super::types::{
    Duration, Node, Path, Point, Relationship, Structure, Time, UnboundRelationship, Value,
    ZonedDateTime,
};

/// 0001-01-01 기준 1970-01-01 의 일 수
const UNIX_EPOCH_DAYS_FROM_CE: i64 = 719_163;

const NANOS_PER_SECOND: i64 = 1_000_000_000;
const NANOS_PER_DAY: i64 = 86_400 * NANOS_PER_SECOND;

/// 태그 하나를 처리하는 디코더
pub type StructureDecoder = fn(&Hydrator, PackStreamStructure) -> DriverResult<Value>;

// ============================================================================
// Hydrator - 디코더 테이블
// ============================================================================

/// 태그별 구조체 디코더 테이블
///
/// [`Hydrator::default`] 는 그래프, 시간, 공간 구조체를 모두 등록합니다.
/// 사용자 디코더는 [`Hydrator::register`] 로 덮어쓰거나 추가합니다.
#[derive(Clone)]
pub struct Hydrator {
    decoders: HashMap<u8, StructureDecoder>,
}

impl Hydrator {
    /// 디코더가 하나도 없는 테이블
    pub fn empty() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// 디코더 등록. 기존 디코더가 있으면 반환합니다.
    pub fn register(&mut self, tag: u8, decoder: StructureDecoder) -> Option<StructureDecoder> {
        self.decoders.insert(tag, decoder)
    }

    /// 디코더 제거
    pub fn unregister(&mut self, tag: u8) -> Option<StructureDecoder> {
        self.decoders.remove(&tag)
    }

    /// 태그 등록 여부
    pub fn supports(&self, tag: u8) -> bool {
        self.decoders.contains_key(&tag)
    }

    /// 와이어 값 하이드레이션 (재귀)
    pub fn hydrate(&self, value: PackStreamValue) -> DriverResult<Value> {
        Ok(match value {
            PackStreamValue::Null => Value::Null,
            PackStreamValue::Boolean(b) => Value::Boolean(b),
            PackStreamValue::Integer(i) => Value::Integer(i),
            PackStreamValue::Float(f) => Value::Float(f),
            PackStreamValue::Bytes(b) => Value::Bytes(b),
            PackStreamValue::String(s) => Value::String(s),
            PackStreamValue::List(items) => Value::List(
                items
                    .into_iter()
                    .map(|item| self.hydrate(item))
                    .collect::<DriverResult<_>>()?,
            ),
            PackStreamValue::Map(entries) => Value::Map(self.hydrate_map(entries)?),
            PackStreamValue::Structure(s) => match self.decoders.get(&s.tag) {
                Some(decoder) => decoder(self, s)?,
                None => Value::Structure(Structure {
                    tag: s.tag,
                    fields: self.hydrate_row(s.fields)?,
                }),
            },
        })
    }

    /// 레코드 한 줄 하이드레이션
    pub fn hydrate_row(&self, fields: Vec<PackStreamValue>) -> DriverResult<Vec<Value>> {
        fields.into_iter().map(|field| self.hydrate(field)).collect()
    }

    /// 맵 하이드레이션
    pub fn hydrate_map(&self, entries: PackStreamMap) -> DriverResult<HashMap<String, Value>> {
        entries
            .into_iter()
            .map(|(k, v)| Ok((k, self.hydrate(v)?)))
            .collect()
    }

    /// 값을 와이어 값으로 변환
    pub fn dehydrate(&self, value: Value) -> DriverResult<PackStreamValue> {
        Ok(match value {
            Value::Null => PackStreamValue::Null,
            Value::Boolean(b) => PackStreamValue::Boolean(b),
            Value::Integer(i) => PackStreamValue::Integer(i),
            Value::Float(f) => PackStreamValue::Float(f),
            Value::String(s) => PackStreamValue::String(s),
            Value::Bytes(b) => PackStreamValue::Bytes(b),
            Value::List(items) => PackStreamValue::List(
                items
                    .into_iter()
                    .map(|item| self.dehydrate(item))
                    .collect::<DriverResult<_>>()?,
            ),
            Value::Map(entries) => PackStreamValue::Map(self.dehydrate_map(entries)?),
            Value::Node(node) => self.dehydrate_node(node)?,
            Value::Relationship(rel) => structure(
                tag::RELATIONSHIP,
                vec![
                    rel.id.into(),
                    rel.start_node_id.into(),
                    rel.end_node_id.into(),
                    rel.rel_type.into(),
                    PackStreamValue::Map(self.dehydrate_map(rel.properties)?),
                ],
            ),
            Value::Path(path) => self.dehydrate_path(path)?,
            Value::Point(point) => dehydrate_point(point),
            Value::Date(date) => structure(tag::DATE, vec![days_since_epoch(date).into()]),
            Value::Time(time) => structure(
                tag::TIME,
                vec![
                    nanos_of_day(time.time).into(),
                    time.offset_seconds.into(),
                ],
            ),
            Value::LocalTime(time) => structure(tag::LOCAL_TIME, vec![nanos_of_day(time).into()]),
            Value::DateTime(dt) => {
                let (seconds, nanos) = split_local(dt.naive_local());
                structure(
                    tag::DATE_TIME,
                    vec![
                        seconds.into(),
                        nanos.into(),
                        dt.offset().local_minus_utc().into(),
                    ],
                )
            }
            Value::ZonedDateTime(dt) => {
                let (seconds, nanos) = split_local(dt.local);
                structure(
                    tag::DATE_TIME_ZONE_ID,
                    vec![seconds.into(), nanos.into(), dt.zone_id.into()],
                )
            }
            Value::LocalDateTime(dt) => {
                let (seconds, nanos) = split_local(dt);
                structure(tag::LOCAL_DATE_TIME, vec![seconds.into(), nanos.into()])
            }
            Value::Duration(d) => structure(
                tag::DURATION,
                vec![
                    d.months.into(),
                    d.days.into(),
                    d.seconds.into(),
                    d.nanoseconds.into(),
                ],
            ),
            Value::Structure(s) => PackStreamValue::Structure(PackStreamStructure::new(
                s.tag,
                s.fields
                    .into_iter()
                    .map(|field| self.dehydrate(field))
                    .collect::<DriverResult<_>>()?,
            )),
        })
    }

    /// 파라미터 맵 변환
    pub fn dehydrate_map(&self, entries: HashMap<String, Value>) -> DriverResult<PackStreamMap> {
        entries
            .into_iter()
            .map(|(k, v)| Ok((k, self.dehydrate(v)?)))
            .collect::<DriverResult<BTreeMap<_, _>>>()
    }

    fn dehydrate_node(&self, node: Node) -> DriverResult<PackStreamValue> {
        Ok(structure(
            tag::NODE,
            vec![
                node.id.into(),
                node.labels.into(),
                PackStreamValue::Map(self.dehydrate_map(node.properties)?),
            ],
        ))
    }

    fn dehydrate_path(&self, path: Path) -> DriverResult<PackStreamValue> {
        if path.nodes.len() != path.relationships.len() + 1 {
            return Err(DriverError::hydration(format!(
                "Path with {} nodes cannot hold {} relationships",
                path.nodes.len(),
                path.relationships.len()
            )));
        }

        let mut node_ids: Vec<i64> = Vec::new();
        let mut nodes = Vec::new();
        for node in &path.nodes {
            if !node_ids.contains(&node.id) {
                node_ids.push(node.id);
                nodes.push(self.dehydrate_node(node.clone())?);
            }
        }

        let mut rel_ids: Vec<i64> = Vec::new();
        let mut rels = Vec::new();
        let mut sequence = Vec::with_capacity(path.relationships.len() * 2);
        for (i, rel) in path.relationships.into_iter().enumerate() {
            let here = path.nodes[i].id;
            let next = path.nodes[i + 1].id;
            let position = match rel_ids.iter().position(|id| *id == rel.id) {
                Some(p) => p,
                None => {
                    rel_ids.push(rel.id);
                    rels.push(structure(
                        tag::UNBOUND_RELATIONSHIP,
                        vec![
                            rel.id.into(),
                            rel.rel_type.clone().into(),
                            PackStreamValue::Map(self.dehydrate_map(rel.properties.clone())?),
                        ],
                    ));
                    rel_ids.len() - 1
                }
            };
            let index = position as i64 + 1;
            let signed = if rel.start_node_id == here && rel.end_node_id == next {
                index
            } else {
                -index
            };
            let node_index = node_ids.iter().position(|id| *id == next).unwrap_or(0) as i64;
            sequence.push(PackStreamValue::Integer(signed));
            sequence.push(PackStreamValue::Integer(node_index));
        }

        Ok(structure(
            tag::PATH,
            vec![
                PackStreamValue::List(nodes),
                PackStreamValue::List(rels),
                PackStreamValue::List(sequence),
            ],
        ))
    }
}

impl Default for Hydrator {
    fn default() -> Self {
        let mut hydrator = Self::empty();
        hydrator.register(tag::NODE, decode_node);
        hydrator.register(tag::RELATIONSHIP, decode_relationship);
        hydrator.register(tag::PATH, decode_path);
        hydrator.register(tag::DATE, decode_date);
        hydrator.register(tag::TIME, decode_time);
        hydrator.register(tag::LOCAL_TIME, decode_local_time);
        hydrator.register(tag::DATE_TIME, decode_date_time);
        hydrator.register(tag::DATE_TIME_ZONE_ID, decode_zoned_date_time);
        hydrator.register(tag::LOCAL_DATE_TIME, decode_local_date_time);
        hydrator.register(tag::DURATION, decode_duration);
        hydrator.register(tag::POINT_2D, decode_point);
        hydrator.register(tag::POINT_3D, decode_point);
        hydrator
    }
}

impl fmt::Debug for Hydrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<char> = self.decoders.keys().map(|t| *t as char).collect();
        tags.sort_unstable();
        f.debug_struct("Hydrator").field("tags", &tags).finish()
    }
}

fn structure(tag: u8, fields: Vec<PackStreamValue>) -> PackStreamValue {
    PackStreamValue::Structure(PackStreamStructure::new(tag, fields))
}

// ============================================================================
// Fields - 구조체 필드 읽기
// ============================================================================

struct Fields {
    tag: u8,
    index: usize,
    iter: std::vec::IntoIter<PackStreamValue>,
}

impl Fields {
    fn new(s: PackStreamStructure, expected: usize) -> DriverResult<Self> {
        if s.fields.len() < expected {
            return Err(DriverError::hydration(format!(
                "Structure '{}' needs {} fields ({} provided)",
                s.tag as char,
                expected,
                s.fields.len()
            )));
        }
        Ok(Self {
            tag: s.tag,
            index: 0,
            iter: s.fields.into_iter(),
        })
    }

    fn next(&mut self) -> DriverResult<PackStreamValue> {
        self.index += 1;
        self.iter.next().ok_or_else(|| {
            DriverError::hydration(format!(
                "Structure '{}' is missing field {}",
                self.tag as char,
                self.index - 1
            ))
        })
    }

    fn mismatch(&self, expected: &str, got: &PackStreamValue) -> DriverError {
        DriverError::hydration(format!(
            "Structure '{}' field {} must be {} (got {})",
            self.tag as char,
            self.index - 1,
            expected,
            got.type_name()
        ))
    }

    fn int(&mut self) -> DriverResult<i64> {
        let value = self.next()?;
        value.as_int().ok_or_else(|| self.mismatch("Integer", &value))
    }

    fn float(&mut self) -> DriverResult<f64> {
        let value = self.next()?;
        value.as_float().ok_or_else(|| self.mismatch("Float", &value))
    }

    fn string(&mut self) -> DriverResult<String> {
        match self.next()? {
            PackStreamValue::String(s) => Ok(s),
            other => Err(self.mismatch("String", &other)),
        }
    }

    fn list(&mut self) -> DriverResult<Vec<PackStreamValue>> {
        match self.next()? {
            PackStreamValue::List(items) => Ok(items),
            other => Err(self.mismatch("List", &other)),
        }
    }

    fn map(&mut self) -> DriverResult<PackStreamMap> {
        match self.next()? {
            PackStreamValue::Map(entries) => Ok(entries),
            other => Err(self.mismatch("Map", &other)),
        }
    }

    fn rest(self) -> Vec<PackStreamValue> {
        self.iter.collect()
    }
}

fn expect_structure(value: PackStreamValue, tag: u8) -> DriverResult<PackStreamStructure> {
    match value {
        PackStreamValue::Structure(s) if s.tag == tag => Ok(s),
        other => Err(DriverError::hydration(format!(
            "Expected structure '{}', got {}",
            tag as char,
            other.type_name()
        ))),
    }
}

// ============================================================================
// 그래프 디코더
// ============================================================================

fn node_from(h: &Hydrator, s: PackStreamStructure) -> DriverResult<Node> {
    let mut f = Fields::new(s, 3)?;
    let id = f.int()?;
    let labels = f
        .list()?
        .into_iter()
        .map(|label| match label {
            PackStreamValue::String(s) => Ok(s),
            other => Err(DriverError::hydration(format!(
                "Node label must be String (got {})",
                other.type_name()
            ))),
        })
        .collect::<DriverResult<Vec<_>>>()?;
    let properties = h.hydrate_map(f.map()?)?;
    Ok(Node::new(id, labels, properties))
}

fn decode_node(h: &Hydrator, s: PackStreamStructure) -> DriverResult<Value> {
    node_from(h, s).map(Value::Node)
}

fn decode_relationship(h: &Hydrator, s: PackStreamStructure) -> DriverResult<Value> {
    let mut f = Fields::new(s, 5)?;
    let id = f.int()?;
    let start = f.int()?;
    let end = f.int()?;
    let rel_type = f.string()?;
    let properties = h.hydrate_map(f.map()?)?;
    Ok(Value::Relationship(Relationship::new(
        id, start, end, rel_type, properties,
    )))
}

fn unbound_from(h: &Hydrator, s: PackStreamStructure) -> DriverResult<UnboundRelationship> {
    let mut f = Fields::new(s, 3)?;
    Ok(UnboundRelationship {
        id: f.int()?,
        rel_type: f.string()?,
        properties: h.hydrate_map(f.map()?)?,
    })
}

/// 경로 디코더
///
/// 순서열은 `(관계 인덱스, 노드 인덱스)` 쌍입니다. 관계 인덱스는 1부터
/// 시작하고, 음수면 관계가 진행 방향과 반대입니다.
fn decode_path(h: &Hydrator, s: PackStreamStructure) -> DriverResult<Value> {
    let mut f = Fields::new(s, 3)?;
    let nodes = f
        .list()?
        .into_iter()
        .map(|n| node_from(h, expect_structure(n, tag::NODE)?))
        .collect::<DriverResult<Vec<_>>>()?;
    let rels = f
        .list()?
        .into_iter()
        .map(|r| unbound_from(h, expect_structure(r, tag::UNBOUND_RELATIONSHIP)?))
        .collect::<DriverResult<Vec<_>>>()?;
    let sequence = f
        .list()?
        .into_iter()
        .map(|i| {
            i.as_int()
                .ok_or_else(|| DriverError::hydration("Path sequence must hold integers"))
        })
        .collect::<DriverResult<Vec<_>>>()?;

    if sequence.len() % 2 != 0 {
        return Err(DriverError::hydration("Path sequence has odd length"));
    }
    let mut last = nodes
        .first()
        .cloned()
        .ok_or_else(|| DriverError::hydration("Path has no nodes"))?;

    let mut path_nodes = vec![last.clone()];
    let mut path_rels = Vec::with_capacity(sequence.len() / 2);
    for pair in sequence.chunks(2) {
        let (rel_index, node_index) = (pair[0], pair[1]);
        let next = usize::try_from(node_index)
            .ok()
            .and_then(|i| nodes.get(i))
            .cloned()
            .ok_or_else(|| DriverError::hydration(format!("Path node index {} out of range", node_index)))?;
        let unbound = usize::try_from(rel_index.unsigned_abs())
            .ok()
            .filter(|i| *i > 0)
            .and_then(|i| rels.get(i - 1))
            .cloned()
            .ok_or_else(|| {
                DriverError::hydration(format!("Path relationship index {} out of range", rel_index))
            })?;
        let rel = if rel_index > 0 {
            unbound.bind(last.id, next.id)
        } else {
            unbound.bind(next.id, last.id)
        };
        path_rels.push(rel);
        path_nodes.push(next.clone());
        last = next;
    }
    Ok(Value::Path(Path::new(path_nodes, path_rels)))
}

// ============================================================================
// 시간 디코더
// ============================================================================

fn date_from_days(days: i64) -> DriverResult<NaiveDate> {
    days.checked_add(UNIX_EPOCH_DAYS_FROM_CE)
        .and_then(|d| i32::try_from(d).ok())
        .and_then(NaiveDate::from_num_days_from_ce_opt)
        .ok_or_else(|| DriverError::hydration(format!("Date out of range: {} days", days)))
}

fn days_since_epoch(date: NaiveDate) -> i64 {
    date.num_days_from_ce() as i64 - UNIX_EPOCH_DAYS_FROM_CE
}

fn time_from_nanos(nanos: i64) -> DriverResult<NaiveTime> {
    if !(0..NANOS_PER_DAY).contains(&nanos) {
        return Err(DriverError::hydration(format!("Time out of range: {} ns", nanos)));
    }
    NaiveTime::from_num_seconds_from_midnight_opt(
        (nanos / NANOS_PER_SECOND) as u32,
        (nanos % NANOS_PER_SECOND) as u32,
    )
    .ok_or_else(|| DriverError::hydration(format!("Time out of range: {} ns", nanos)))
}

fn nanos_of_day(time: NaiveTime) -> i64 {
    time.num_seconds_from_midnight() as i64 * NANOS_PER_SECOND + time.nanosecond() as i64
}

/// 초/나노초 (현지 벽시계 기준) 를 일시로
fn local_from_parts(seconds: i64, nanos: i64) -> DriverResult<NaiveDateTime> {
    u32::try_from(nanos)
        .ok()
        .filter(|n| (*n as i64) < NANOS_PER_SECOND)
        .and_then(|n| DateTime::from_timestamp(seconds, n))
        .map(|dt| dt.naive_utc())
        .ok_or_else(|| {
            DriverError::hydration(format!("DateTime out of range: {}s {}ns", seconds, nanos))
        })
}

fn split_local(dt: NaiveDateTime) -> (i64, i64) {
    let utc = dt.and_utc();
    (utc.timestamp(), utc.timestamp_subsec_nanos() as i64)
}

fn offset_from(seconds: i64) -> DriverResult<FixedOffset> {
    i32::try_from(seconds)
        .ok()
        .and_then(FixedOffset::east_opt)
        .ok_or_else(|| DriverError::hydration(format!("UTC offset out of range: {}s", seconds)))
}

fn decode_date(_: &Hydrator, s: PackStreamStructure) -> DriverResult<Value> {
    let mut f = Fields::new(s, 1)?;
    date_from_days(f.int()?).map(Value::Date)
}

fn decode_time(_: &Hydrator, s: PackStreamStructure) -> DriverResult<Value> {
    let mut f = Fields::new(s, 2)?;
    let time = time_from_nanos(f.int()?)?;
    let offset = offset_from(f.int()?)?;
    Ok(Value::Time(Time::new(time, offset.local_minus_utc())))
}

fn decode_local_time(_: &Hydrator, s: PackStreamStructure) -> DriverResult<Value> {
    let mut f = Fields::new(s, 1)?;
    time_from_nanos(f.int()?).map(Value::LocalTime)
}

fn decode_date_time(_: &Hydrator, s: PackStreamStructure) -> DriverResult<Value> {
    let mut f = Fields::new(s, 3)?;
    let local = local_from_parts(f.int()?, f.int()?)?;
    let offset = offset_from(f.int()?)?;
    offset
        .from_local_datetime(&local)
        .single()
        .map(Value::DateTime)
        .ok_or_else(|| DriverError::hydration(format!("Invalid local time {} at {}", local, offset)))
}

fn decode_zoned_date_time(_: &Hydrator, s: PackStreamStructure) -> DriverResult<Value> {
    let mut f = Fields::new(s, 3)?;
    let local = local_from_parts(f.int()?, f.int()?)?;
    let zone_id = f.string()?;
    Ok(Value::ZonedDateTime(ZonedDateTime::new(local, zone_id)))
}

fn decode_local_date_time(_: &Hydrator, s: PackStreamStructure) -> DriverResult<Value> {
    let mut f = Fields::new(s, 2)?;
    local_from_parts(f.int()?, f.int()?).map(Value::LocalDateTime)
}

fn decode_duration(_: &Hydrator, s: PackStreamStructure) -> DriverResult<Value> {
    let mut f = Fields::new(s, 4)?;
    let months = f.int()?;
    let days = f.int()?;
    let seconds = f.int()?;
    let nanos = f.int()?;
    let nanos = i32::try_from(nanos)
        .map_err(|_| DriverError::hydration(format!("Duration nanoseconds out of range: {}", nanos)))?;
    Ok(Value::Duration(Duration::new(months, days, seconds, nanos)))
}

// ============================================================================
// 공간 디코더
// ============================================================================

/// 점 디코더
///
/// 알려진 SRID 는 좌표 수가 맞아야 하고, 모르는 SRID 는 좌표 수대로
/// 통과시킵니다.
fn decode_point(_: &Hydrator, s: PackStreamStructure) -> DriverResult<Value> {
    let mut f = Fields::new(s, 3)?;
    let srid = f.int()?;
    let srid = i32::try_from(srid)
        .map_err(|_| DriverError::hydration(format!("SRID out of range: {}", srid)))?;
    let x = f.float()?;
    let y = f.float()?;
    let rest = f.rest();
    let provided = 2 + rest.len();

    if let Some(dim) = Point::dimensions_for(srid) {
        if provided != dim {
            return Err(DriverError::hydration(format!(
                "SRID {} requires {} coordinates ({} provided)",
                srid, dim, provided
            )));
        }
    }
    match rest.as_slice() {
        [] => Ok(Value::Point(Point::new_2d(srid, x, y))),
        [z] => {
            let z = z
                .as_float()
                .ok_or_else(|| DriverError::hydration("Point coordinate must be Float"))?;
            Ok(Value::Point(Point::new_3d(srid, x, y, z)))
        }
        _ => Err(DriverError::hydration(format!(
            "Point with {} coordinates is not supported",
            provided
        ))),
    }
}

fn dehydrate_point(point: Point) -> PackStreamValue {
    match point.z {
        Some(z) => structure(
            tag::POINT_3D,
            vec![point.srid.into(), point.x.into(), point.y.into(), z.into()],
        ),
        None => structure(
            tag::POINT_2D,
            vec![point.srid.into(), point.x.into(), point.y.into()],
        ),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::types::Entity;

    fn s(tag: u8, fields: Vec<PackStreamValue>) -> PackStreamValue {
        structure(tag, fields)
    }

    fn raw_node(id: i64, label: &str) -> PackStreamValue {
        s(
            tag::NODE,
            vec![
                id.into(),
                vec![label.to_string()].into(),
                PackStreamValue::map([("name", PackStreamValue::from(format!("n{}", id)))]),
            ],
        )
    }

    #[test]
    fn test_node_and_nested_containers() {
        let h = Hydrator::default();
        let value = PackStreamValue::List(vec![PackStreamValue::map([("n", raw_node(7, "Person"))])]);
        let hydrated = h.hydrate(value).unwrap();
        let node = hydrated.as_list().unwrap()[0].as_map().unwrap()["n"].as_node().unwrap().clone();
        assert_eq!(node.id, 7);
        assert!(node.has_label("Person"));
        assert_eq!(node.get("name"), Some(&Value::String("n7".into())));
    }

    #[test]
    fn test_relationship() {
        let h = Hydrator::default();
        let raw = s(
            tag::RELATIONSHIP,
            vec![
                1.into(),
                10.into(),
                20.into(),
                "KNOWS".into(),
                PackStreamValue::map([("since", PackStreamValue::Integer(2020))]),
            ],
        );
        let rel = h.hydrate(raw).unwrap();
        let rel = rel.as_relationship().unwrap();
        assert_eq!((rel.start_node_id, rel.end_node_id), (10, 20));
        assert_eq!(rel.get("since"), Some(&Value::Integer(2020)));
    }

    #[test]
    fn test_path_with_reversed_relationship() {
        let h = Hydrator::default();
        let unbound = |id: i64| {
            s(
                tag::UNBOUND_RELATIONSHIP,
                vec![id.into(), "LINK".into(), PackStreamValue::map(Vec::<(String, _)>::new())],
            )
        };
        // (1)-[100]->(2)<-[200]-(3)
        let raw = s(
            tag::PATH,
            vec![
                PackStreamValue::List(vec![raw_node(1, "A"), raw_node(2, "B"), raw_node(3, "C")]),
                PackStreamValue::List(vec![unbound(100), unbound(200)]),
                PackStreamValue::List(vec![1.into(), 1.into(), (-2).into(), 2.into()]),
            ],
        );
        let value = h.hydrate(raw).unwrap();
        let path = value.as_path().unwrap();
        assert_eq!(path.len(), 2);
        assert_eq!(path.nodes.iter().map(|n| n.id).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(
            (path.relationships[0].start_node_id, path.relationships[0].end_node_id),
            (1, 2)
        );
        assert_eq!(
            (path.relationships[1].start_node_id, path.relationships[1].end_node_id),
            (3, 2)
        );

        let raw_again = h.dehydrate(value.clone()).unwrap();
        assert_eq!(h.hydrate(raw_again).unwrap(), value);
    }

    #[test]
    fn test_path_bad_index() {
        let h = Hydrator::default();
        let raw = s(
            tag::PATH,
            vec![
                PackStreamValue::List(vec![raw_node(1, "A")]),
                PackStreamValue::List(vec![]),
                PackStreamValue::List(vec![0.into(), 0.into()]),
            ],
        );
        assert!(matches!(h.hydrate(raw), Err(DriverError::Hydration(_))));
    }

    #[test]
    fn test_temporal_values() {
        let h = Hydrator::default();

        let date = h.hydrate(s(tag::DATE, vec![0.into()])).unwrap();
        assert_eq!(date, Value::Date(NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()));
        let date = h.hydrate(s(tag::DATE, vec![(-1).into()])).unwrap();
        assert_eq!(date, Value::Date(NaiveDate::from_ymd_opt(1969, 12, 31).unwrap()));

        let noon = 12 * 3600 * NANOS_PER_SECOND + 5;
        let time = h.hydrate(s(tag::TIME, vec![noon.into(), 3600.into()])).unwrap();
        assert_eq!(
            time,
            Value::Time(Time::new(NaiveTime::from_hms_nano_opt(12, 0, 0, 5).unwrap(), 3600))
        );

        // 시각은 현지 기준, 오프셋은 별도 필드
        let dt = h
            .hydrate(s(tag::DATE_TIME, vec![3600.into(), 0.into(), 7200.into()]))
            .unwrap();
        match dt {
            Value::DateTime(dt) => {
                assert_eq!(dt.naive_local().to_string(), "1970-01-01 01:00:00");
                assert_eq!(dt.offset().local_minus_utc(), 7200);
            }
            other => panic!("unexpected {:?}", other),
        }

        let zoned = h
            .hydrate(s(
                tag::DATE_TIME_ZONE_ID,
                vec![86_400.into(), 0.into(), "Europe/Stockholm".into()],
            ))
            .unwrap();
        assert_eq!(zoned.to_string(), "1970-01-02 00:00:00[Europe/Stockholm]");

        let d = h
            .hydrate(s(tag::DURATION, vec![1.into(), 2.into(), 3.into(), 4.into()]))
            .unwrap();
        assert_eq!(d, Value::Duration(Duration::new(1, 2, 3, 4)));
    }

    #[test]
    fn test_temporal_dehydrate() {
        let h = Hydrator::default();
        let offset = FixedOffset::east_opt(-3600).unwrap();
        let local = NaiveDate::from_ymd_opt(2021, 3, 4)
            .unwrap()
            .and_hms_nano_opt(5, 6, 7, 8)
            .unwrap();
        let dt = offset.from_local_datetime(&local).single().unwrap();
        let raw = h.dehydrate(Value::DateTime(dt)).unwrap();
        let st = raw.as_structure().unwrap();
        assert_eq!(st.tag, tag::DATE_TIME);
        assert_eq!(st.fields[0].as_int(), Some(local.and_utc().timestamp()));
        assert_eq!(st.fields[1].as_int(), Some(8));
        assert_eq!(st.fields[2].as_int(), Some(-3600));
        assert_eq!(h.hydrate(raw).unwrap(), Value::DateTime(dt));

        let raw = h.dehydrate(Value::LocalTime(NaiveTime::from_hms_opt(0, 0, 1).unwrap())).unwrap();
        assert_eq!(raw.as_structure().unwrap().fields[0].as_int(), Some(NANOS_PER_SECOND));
    }

    #[test]
    fn test_point_srid_validation() {
        let h = Hydrator::default();
        let p = h
            .hydrate(s(tag::POINT_2D, vec![4326.into(), 1.5.into(), 2.5.into()]))
            .unwrap();
        assert_eq!(p, Value::Point(Point::wgs84_2d(1.5, 2.5)));

        let err = h
            .hydrate(s(tag::POINT_2D, vec![9157.into(), 1.0.into(), 2.0.into()]))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Hydration error: SRID 9157 requires 3 coordinates (2 provided)"
        );

        // 모르는 SRID 는 통과
        let p = h
            .hydrate(s(tag::POINT_3D, vec![1.into(), 1.0.into(), 2.0.into(), 3.0.into()]))
            .unwrap();
        assert_eq!(p.as_point().unwrap().z, Some(3.0));
    }

    #[test]
    fn test_unknown_tag_passes_through() {
        let h = Hydrator::default();
        let raw = s(0x51, vec![raw_node(1, "A"), 2.into()]);
        let value = h.hydrate(raw.clone()).unwrap();
        match &value {
            Value::Structure(st) => {
                assert_eq!(st.tag, 0x51);
                assert!(st.fields[0].as_node().is_some());
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(h.dehydrate(value).unwrap(), raw);
    }

    #[test]
    fn test_register_custom_decoder() {
        fn as_tag(_: &Hydrator, s: PackStreamStructure) -> DriverResult<Value> {
            Ok(Value::Integer(s.tag as i64))
        }

        let mut h = Hydrator::empty();
        assert!(!h.supports(tag::NODE));
        assert!(h.register(tag::NODE, as_tag).is_none());
        assert_eq!(h.hydrate(raw_node(1, "A")).unwrap(), Value::Integer(tag::NODE as i64));
        assert!(h.register(tag::NODE, decode_node).is_some());
        assert!(h.hydrate(raw_node(1, "A")).unwrap().as_node().is_some());
    }

    #[test]
    fn test_short_structure_fails() {
        let h = Hydrator::default();
        let err = h.hydrate(s(tag::NODE, vec![1.into()])).unwrap_err();
        assert!(matches!(err, DriverError::Hydration(_)));
        let err = h.hydrate(s(tag::DATE, vec!["x".into()])).unwrap_err();
        assert!(err.to_string().contains("must be Integer"));
    }

    #[test]
    fn test_dehydrate_params() {
        let h = Hydrator::default();
        let params = crate::params! { "d" => Value::Date(NaiveDate::from_ymd_opt(1970, 1, 11).unwrap()), "x" => 1i64 };
        let map = h.dehydrate_map(params).unwrap();
        assert_eq!(map["x"], PackStreamValue::Integer(1));
        assert_eq!(map["d"].as_structure().unwrap().fields[0].as_int(), Some(10));
    }
}
