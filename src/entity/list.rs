use std::sync::Arc;

use foldhash::{HashMap, HashMapExt};

use crate::entity::decoder::PropValue;

pub const MAX_EDICT_BITS: u32 = 11;
pub const MAX_EDICTS: usize = 1 << MAX_EDICT_BITS;
pub const SERIAL_NUMBER_BITS: u32 = 10;

const INVALID_NETWORKED_EHANDLE: i32 = (1 << (MAX_EDICT_BITS + SERIAL_NUMBER_BITS)) - 1;

const MAX_ENTITIES_IN_LIST: usize = 512;
const MAX_ENTITY_LISTS: usize = MAX_EDICTS / MAX_ENTITIES_IN_LIST;

const ENTITY_CHUNK_SHIFT: u32 = MAX_ENTITIES_IN_LIST.trailing_zeros();
const ENTITY_OFFSET_MASK: usize = MAX_ENTITIES_IN_LIST - 1;

/// entity slot referenced by a networked handle, `None` for the invalid handle
pub fn index_from_handle(handle: i32) -> Option<usize> {
    if handle == INVALID_NETWORKED_EHANDLE {
        return None;
    }

    Some((handle & ((1 << MAX_EDICT_BITS) - 1)) as usize)
}

pub struct EntityItem {
    pub index: u32,
    pub serial: u32,
    pub class_id: u32,
    /// last decoded value of every prop seen so far, by prop name
    pub props: HashMap<Arc<str>, PropValue>,
}

impl EntityItem {
    pub fn new(index: u32, class_id: u32, serial: u32) -> Self {
        Self {
            index,
            serial,
            class_id,
            props: HashMap::new(),
        }
    }

    #[inline]
    pub fn prop(&self, name: &str) -> Option<&PropValue> {
        self.props.get(name)
    }

    pub fn prop_int(&self, name: &str) -> Option<i32> {
        self.prop(name).and_then(PropValue::as_int)
    }

    pub fn prop_vector(&self, name: &str) -> Option<crate::bit::Vector3> {
        self.prop(name).and_then(PropValue::as_vector)
    }
}

/// a chunked slot table in the manner of CConcreteEntityList,
/// chunks are only allocated once a slot inside them is used
pub struct EntityList {
    entity_chunk: [Option<Box<EntityChunk>>; MAX_ENTITY_LISTS],
}

struct EntityChunk {
    counter: usize,
    entities: [Option<EntityItem>; MAX_ENTITIES_IN_LIST],
}

impl EntityList {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            entity_chunk: [const { None }; MAX_ENTITY_LISTS],
        }
    }

    fn chunk(&self, idx: usize) -> Option<&EntityChunk> {
        self.entity_chunk.get(idx)?.as_deref()
    }

    fn chunk_mut(&mut self, idx: usize) -> Option<&mut EntityChunk> {
        self.entity_chunk.get_mut(idx)?.as_deref_mut()
    }

    pub fn get(&self, idx: usize) -> Option<&EntityItem> {
        let chunk = self.chunk(idx >> ENTITY_CHUNK_SHIFT)?;
        chunk.entities[idx & ENTITY_OFFSET_MASK].as_ref()
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut EntityItem> {
        let chunk = self.chunk_mut(idx >> ENTITY_CHUNK_SHIFT)?;
        chunk.entities[idx & ENTITY_OFFSET_MASK].as_mut()
    }

    pub fn delete(&mut self, idx: usize) -> Option<EntityItem> {
        let chunk_idx = idx >> ENTITY_CHUNK_SHIFT;
        let chunk = self.chunk_mut(chunk_idx)?;

        let entity = chunk.entities[idx & ENTITY_OFFSET_MASK].take()?;

        chunk.counter -= 1;
        if chunk.counter == 0 {
            self.entity_chunk[chunk_idx] = None;
        }

        Some(entity)
    }

    /// places `entity` in its slot, returning the previous occupant
    pub fn insert(&mut self, entity: EntityItem) -> Option<EntityItem> {
        let idx = entity.index as usize;
        let chunk_idx = idx >> ENTITY_CHUNK_SHIFT;
        let slot = self.entity_chunk.get_mut(chunk_idx)?;

        let chunk = slot.get_or_insert_with(|| {
            Box::new(EntityChunk {
                counter: 0,
                entities: [const { None }; MAX_ENTITIES_IN_LIST],
            })
        });

        let old_entity = &mut chunk.entities[idx & ENTITY_OFFSET_MASK];
        if old_entity.is_none() {
            chunk.counter += 1;
        }
        old_entity.replace(entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_delete() {
        let mut list = EntityList::new();
        assert!(list.insert(EntityItem::new(3, 1, 7)).is_none());
        assert!(list.insert(EntityItem::new(1500, 2, 9)).is_none());

        assert_eq!(list.get(3).map(|e| e.serial), Some(7));
        assert_eq!(list.get(1500).map(|e| e.class_id), Some(2));

        let old = list.insert(EntityItem::new(3, 4, 8)).unwrap();
        assert_eq!(old.class_id, 1);
        assert_eq!(list.get(3).map(|e| e.serial), Some(8));

        assert!(list.delete(1500).is_some());
        assert!(list.delete(1500).is_none());
        assert!(list.get(1500).is_none());
        assert!(list.get(MAX_EDICTS + 5).is_none());
        assert!(list.insert(EntityItem::new(MAX_EDICTS as u32, 0, 0)).is_none());
        assert!(list.get(MAX_EDICTS).is_none());
        assert!(list.get(3).is_some());
    }

    #[test]
    fn handles() {
        assert_eq!(index_from_handle((5 << MAX_EDICT_BITS) | 12), Some(12));
        assert_eq!(index_from_handle(INVALID_NETWORKED_EHANDLE), None);
    }
}
