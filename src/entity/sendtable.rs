use std::sync::Arc;

use crate::bit::BitStream;
use crate::error::invalid_data;

pub const PROP_UNSIGNED: u32 = 1 << 0;
pub const PROP_COORD: u32 = 1 << 1;
pub const PROP_NOSCALE: u32 = 1 << 2;
pub const PROP_ROUNDDOWN: u32 = 1 << 3;
pub const PROP_ROUNDUP: u32 = 1 << 4;
pub const PROP_NORMAL: u32 = 1 << 5;
/// points at another prop to be excluded, is never sent itself
pub const PROP_EXCLUDE: u32 = 1 << 6;
pub const PROP_XYZE: u32 = 1 << 7;
/// element of an array, decoded through the array prop
pub const PROP_INSIDEARRAY: u32 = 1 << 8;
pub const PROP_PROXY_ALWAYS_YES: u32 = 1 << 9;
pub const PROP_CHANGES_OFTEN: u32 = 1 << 10;
pub const PROP_IS_A_VECTOR_ELEM: u32 = 1 << 11;
pub const PROP_COLLAPSIBLE: u32 = 1 << 12;

const MAX_NAME_LEN: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendPropType {
    Int,
    Float,
    Vector,
    String,
    Array,
    DataTable,
}

impl SendPropType {
    fn from_wire(v: u32) -> Option<Self> {
        Some(match v {
            0 => SendPropType::Int,
            1 => SendPropType::Float,
            2 => SendPropType::Vector,
            3 => SendPropType::String,
            4 => SendPropType::Array,
            5 => SendPropType::DataTable,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone)]
pub struct SendProp {
    pub name: Arc<str>,
    pub prop_type: SendPropType,
    pub flags: u32,
    pub low_value: f32,
    pub high_value: f32,
    pub bits: u32,
    pub elements: u32,
    /// referenced table for data table props, or the owning table of an excluded prop
    pub dt_name: String,
    /// `dt_name` resolved against the table list
    pub dt_index: Option<usize>,
}

impl SendProp {
    #[inline]
    pub fn has_flag(&self, flag: u32) -> bool {
        self.flags & flag != 0
    }
}

#[derive(Debug, Clone)]
pub struct SendTable {
    pub name: String,
    pub needs_decoder: bool,
    pub props: Vec<SendProp>,
}

/// position of a leaf prop inside the table graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlattenedProp {
    pub table: usize,
    pub prop: usize,
    /// the element prop of an array, always the sibling right before it
    pub element: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct ServerClass {
    pub id: i32,
    pub name: String,
    pub dt_name: String,
    pub table: usize,
    /// wire order of the class props, an update refers to them by index
    pub props: Vec<FlattenedProp>,
}

#[derive(Debug, Clone, Default)]
pub struct SendTables {
    pub tables: Vec<SendTable>,
    pub classes: Vec<ServerClass>,
    /// position in `classes` by wire class id
    class_index: Vec<Option<usize>>,
    /// width of the class id in enter PVS headers
    pub class_bits: u32,
}

#[inline]
pub(crate) fn int_log2(mut v: u32) -> u32 {
    let mut bits = 0;
    while v > 1 {
        v >>= 1;
        bits += 1;
    }
    bits
}

fn read_send_prop(r: &mut BitStream) -> Result<SendProp, std::io::Error> {
    let raw_type = r.read_ubits(5);
    let name = r.read_string_lossy(MAX_NAME_LEN);
    let flags = r.read_ubits(13);

    let Some(prop_type) = SendPropType::from_wire(raw_type) else {
        return Err(invalid_data("invalid SendProp type in ParseDataTable"));
    };

    let mut prop = SendProp {
        name: Arc::from(name),
        prop_type,
        flags,
        low_value: 0.0,
        high_value: 0.0,
        bits: 0,
        elements: 0,
        dt_name: String::new(),
        dt_index: None,
    };

    if prop_type == SendPropType::DataTable || flags & PROP_EXCLUDE != 0 {
        prop.dt_name = r.read_string_lossy(MAX_NAME_LEN);
        return Ok(prop);
    }

    if prop_type == SendPropType::Array {
        prop.elements = r.read_ubits(10);
    } else {
        prop.low_value = r.read_f32();
        prop.high_value = r.read_f32();
        prop.bits = r.read_ubits(6);
    }

    Ok(prop)
}

impl SendTables {
    /// parses the data tables command and flattens every server class
    pub fn parse(r: &mut BitStream) -> Result<SendTables, std::io::Error> {
        let mut tables = Vec::new();

        while r.read_bit() {
            let needs_decoder = r.read_bit();
            let name = r.read_string_lossy(MAX_NAME_LEN);
            let count = r.read_ubits(9) as usize;

            let mut props = Vec::with_capacity(count);
            for _ in 0..count {
                props.push(read_send_prop(r)?);
            }

            tables.push(SendTable {
                name,
                needs_decoder,
                props,
            });
        }

        let mut this = SendTables {
            tables,
            classes: Vec::new(),
            class_index: Vec::new(),
            class_bits: 0,
        };
        this.resolve_table_names();

        let class_count = r.read_i16() as i32;
        if class_count <= 0 {
            return Err(invalid_data("no server classes in ParseDataTable"));
        }

        this.classes.reserve(class_count as usize);
        this.class_index = vec![None; class_count as usize];
        for _ in 0..class_count {
            let id = r.read_i16() as i32;
            if id < 0 || id >= class_count {
                return Err(invalid_data("invalid class index in ParseDataTable"));
            }

            let name = r.read_string_lossy(MAX_NAME_LEN);
            let dt_name = r.read_string_lossy(MAX_NAME_LEN);

            let Some(table) = this.table_by_name(&dt_name) else {
                return Err(invalid_data(
                    "data table for server class not found in ParseDataTable",
                ));
            };

            this.class_index[id as usize] = Some(this.classes.len());
            this.classes.push(ServerClass {
                id,
                name,
                dt_name,
                table,
                props: Vec::new(),
            });
        }

        for i in 0..this.classes.len() {
            let props = this.flatten(this.classes[i].table);
            this.classes[i].props = props;
        }

        this.class_bits = int_log2(class_count as u32) + 1;

        Ok(this)
    }

    pub fn table_by_name(&self, name: &str) -> Option<usize> {
        self.tables.iter().position(|t| t.name == name)
    }

    /// turns the by-name references into table indices once,
    /// so flattening never compares names again
    fn resolve_table_names(&mut self) {
        let resolved = self
            .tables
            .iter()
            .map(|t| {
                t.props
                    .iter()
                    .map(|p| {
                        if p.dt_name.is_empty() {
                            None
                        } else {
                            self.table_by_name(&p.dt_name)
                        }
                    })
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();

        for (table, indices) in self.tables.iter_mut().zip(resolved) {
            for (prop, index) in table.props.iter_mut().zip(indices) {
                prop.dt_index = index;
            }
        }
    }

    #[inline]
    pub fn prop(&self, table: usize, prop: usize) -> &SendProp {
        &self.tables[table].props[prop]
    }

    #[inline]
    pub fn flattened(&self, fp: &FlattenedProp) -> &SendProp {
        self.prop(fp.table, fp.prop)
    }

    pub fn class(&self, class_id: usize) -> Option<&ServerClass> {
        let index = (*self.class_index.get(class_id)?)?;
        self.classes.get(index)
    }

    /// expands the table graph below `table` into the ordered leaf prop list
    pub fn flatten(&self, table: usize) -> Vec<FlattenedProp> {
        let mut excludes = Vec::new();
        self.gather_excludes(table, &mut excludes);

        let mut props = Vec::new();
        self.gather_props(table, &excludes, &mut props);

        let (mut often, rest): (Vec<_>, Vec<_>) = props
            .into_iter()
            .partition(|fp| self.flattened(fp).has_flag(PROP_CHANGES_OFTEN));
        often.extend(rest);
        often
    }

    /// collects (owning table, prop name) pairs of every exclude prop reachable from `table`
    fn gather_excludes<'a>(&'a self, table: usize, excludes: &mut Vec<(usize, &'a str)>) {
        for prop in &self.tables[table].props {
            if prop.has_flag(PROP_EXCLUDE) {
                // an exclude pointing at an unknown table can never match
                if let Some(dt) = prop.dt_index {
                    excludes.push((dt, &*prop.name));
                }
            }

            if prop.prop_type == SendPropType::DataTable {
                if let Some(sub) = prop.dt_index {
                    self.gather_excludes(sub, excludes);
                }
            }
        }
    }

    fn gather_props(
        &self,
        table: usize,
        excludes: &[(usize, &str)],
        out: &mut Vec<FlattenedProp>,
    ) {
        let mut pending = Vec::new();
        self.iterate_props(table, excludes, &mut pending, out);
        out.append(&mut pending);
    }

    fn iterate_props(
        &self,
        table: usize,
        excludes: &[(usize, &str)],
        pending: &mut Vec<FlattenedProp>,
        out: &mut Vec<FlattenedProp>,
    ) {
        for (i, prop) in self.tables[table].props.iter().enumerate() {
            if prop.has_flag(PROP_INSIDEARRAY | PROP_EXCLUDE)
                || excludes
                    .iter()
                    .any(|&(dt, name)| dt == table && name == &*prop.name)
            {
                continue;
            }

            match prop.prop_type {
                SendPropType::DataTable => {
                    let Some(sub) = prop.dt_index else {
                        continue;
                    };

                    if prop.has_flag(PROP_COLLAPSIBLE) {
                        self.iterate_props(sub, excludes, pending, out);
                    } else {
                        // nested tables land in the class list before the parent's props
                        self.gather_props(sub, excludes, out);
                    }
                }
                SendPropType::Array => pending.push(FlattenedProp {
                    table,
                    prop: i,
                    element: i.checked_sub(1),
                }),
                _ => pending.push(FlattenedProp {
                    table,
                    prop: i,
                    element: None,
                }),
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn leaf(name: &str, prop_type: SendPropType, flags: u32) -> SendProp {
        SendProp {
            name: Arc::from(name),
            prop_type,
            flags,
            low_value: 0.0,
            high_value: 0.0,
            bits: 8,
            elements: 0,
            dt_name: String::new(),
            dt_index: None,
        }
    }

    fn reference(name: &str, target: &str, flags: u32) -> SendProp {
        SendProp {
            dt_name: target.to_string(),
            ..leaf(name, SendPropType::DataTable, flags)
        }
    }

    fn exclude(name: &str, owner: &str) -> SendProp {
        SendProp {
            dt_name: owner.to_string(),
            ..leaf(name, SendPropType::Int, PROP_EXCLUDE)
        }
    }

    fn tables(tables: Vec<(&str, Vec<SendProp>)>) -> SendTables {
        let mut this = SendTables {
            tables: tables
                .into_iter()
                .map(|(name, props)| SendTable {
                    name: name.to_string(),
                    needs_decoder: false,
                    props,
                })
                .collect(),
            classes: Vec::new(),
            class_index: Vec::new(),
            class_bits: 0,
        };
        this.resolve_table_names();
        this
    }

    fn names(st: &SendTables, props: &[FlattenedProp]) -> Vec<String> {
        props
            .iter()
            .map(|fp| st.flattened(fp).name.to_string())
            .collect()
    }

    #[test]
    fn nested_tables_and_excludes() {
        let st = tables(vec![
            (
                "DT_Player",
                vec![
                    reference("baseclass", "DT_Base", PROP_COLLAPSIBLE),
                    leaf("m_iHealth", SendPropType::Int, 0),
                    reference("m_local", "DT_Local", 0),
                    exclude("m_nModelIndex", "DT_Base"),
                    leaf("m_fFlags", SendPropType::Int, 0),
                ],
            ),
            (
                "DT_Base",
                vec![
                    leaf("m_vecOrigin", SendPropType::Vector, 0),
                    leaf("m_nModelIndex", SendPropType::Int, 0),
                ],
            ),
            (
                "DT_Local",
                vec![
                    leaf("m_iFOV", SendPropType::Int, 0),
                    leaf("m_hObserverTarget", SendPropType::Int, 0),
                ],
            ),
        ]);

        let props = st.flatten(0);
        assert_eq!(
            names(&st, &props),
            [
                "m_iFOV",
                "m_hObserverTarget",
                "m_vecOrigin",
                "m_iHealth",
                "m_fFlags"
            ]
        );
    }

    #[test]
    fn changes_often_partition_is_stable() {
        let st = tables(vec![(
            "DT_Test",
            vec![
                leaf("a", SendPropType::Int, 0),
                leaf("b", SendPropType::Int, PROP_CHANGES_OFTEN),
                leaf("c", SendPropType::Int, 0),
                leaf("d", SendPropType::Int, PROP_CHANGES_OFTEN),
                leaf("e", SendPropType::Int, 0),
                leaf("f", SendPropType::Int, PROP_CHANGES_OFTEN),
            ],
        )]);

        let first = st.flatten(0);
        assert_eq!(names(&st, &first), ["b", "d", "f", "a", "c", "e"]);
        assert_eq!(first, st.flatten(0));
    }

    #[test]
    fn arrays_pair_with_their_element() {
        let st = tables(vec![(
            "DT_Weapons",
            vec![
                leaf("000", SendPropType::Int, PROP_INSIDEARRAY),
                SendProp {
                    elements: 48,
                    ..leaf("m_hMyWeapons", SendPropType::Array, 0)
                },
            ],
        )]);

        let props = st.flatten(0);
        assert_eq!(props.len(), 1);
        assert_eq!(props[0].element, Some(0));
        assert_eq!(&*st.flattened(&props[0]).name, "m_hMyWeapons");
    }

    #[test]
    fn parse_requires_server_classes() {
        use bitstream_io::{BitWrite, BitWriter, LittleEndian};
        use bytes::Bytes;

        let mut data = Vec::new();
        {
            let mut w = BitWriter::endian(&mut data, LittleEndian);
            w.write_bit(false).unwrap();
            w.write_var::<u32>(16, 0).unwrap();
            w.byte_align().unwrap();
        }

        let err = SendTables::parse(&mut BitStream::new(Bytes::from(data))).unwrap_err();
        assert_eq!(err.to_string(), "no server classes in ParseDataTable");
    }

    #[test]
    fn classes_resolve_by_wire_id() {
        use bitstream_io::{BitWrite, BitWriter, LittleEndian};
        use bytes::Bytes;

        let mut data = Vec::new();
        {
            let mut w = BitWriter::endian(&mut data, LittleEndian);
            // one empty table
            w.write_bit(true).unwrap();
            w.write_bit(false).unwrap();
            w.write_bytes(b"DT_Empty\0").unwrap();
            w.write_var::<u32>(9, 0).unwrap();
            w.write_bit(false).unwrap();

            // classes sent out of id order
            w.write_bytes(&2i16.to_le_bytes()).unwrap();
            w.write_bytes(&1i16.to_le_bytes()).unwrap();
            w.write_bytes(b"CSecond\0DT_Empty\0").unwrap();
            w.write_bytes(&0i16.to_le_bytes()).unwrap();
            w.write_bytes(b"CFirst\0DT_Empty\0").unwrap();
            w.byte_align().unwrap();
        }

        let st = SendTables::parse(&mut BitStream::new(Bytes::from(data))).unwrap();
        assert_eq!(st.class_bits, 2);
        assert_eq!(st.class(0).map(|c| c.name.as_str()), Some("CFirst"));
        assert_eq!(st.class(1).map(|c| c.name.as_str()), Some("CSecond"));
        assert_eq!(st.class(1).map(|c| c.id), Some(1));
        assert!(st.class(2).is_none());
    }

    #[test]
    fn log2() {
        assert_eq!(int_log2(1), 0);
        assert_eq!(int_log2(2), 1);
        assert_eq!(int_log2(255), 7);
        assert_eq!(int_log2(256), 8);
    }
}
