use im::Vector;

use crate::model::Entity;

/// Immutable view of a store's records. Cloning is O(1); the backing vector
/// is structurally shared with the live collection.
#[derive(Clone, Debug, PartialEq)]
pub struct EntitySnapshot<E: Entity> {
    records: Vector<E>,
}

impl<E: Entity> EntitySnapshot<E> {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &E> {
        self.records.iter()
    }

    pub fn get(&self, id: &E::Id) -> Option<&E> {
        self.records.iter().find(|r| r.id() == id)
    }

    pub fn to_vec(&self) -> Vec<E> {
        self.records.iter().cloned().collect()
    }
}

/// Ordered record collection of one entity type. Insertion order is kept;
/// sibling rank lives in the records themselves.
#[derive(Clone, Debug, PartialEq)]
pub struct Collection<E: Entity> {
    records: Vector<E>,
}

impl<E: Entity> Default for Collection<E> {
    fn default() -> Self {
        Self {
            records: Vector::new(),
        }
    }
}

impl<E: Entity> FromIterator<E> for Collection<E> {
    fn from_iter<I: IntoIterator<Item = E>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

impl<E: Entity> Collection<E> {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &E> {
        self.records.iter()
    }

    pub fn position(&self, id: &E::Id) -> Option<usize> {
        self.records.iter().position(|r| r.id() == id)
    }

    pub fn contains(&self, id: &E::Id) -> bool {
        self.position(id).is_some()
    }

    pub fn get(&self, id: &E::Id) -> Option<&E> {
        self.records.iter().find(|r| r.id() == id)
    }

    pub fn get_mut(&mut self, id: &E::Id) -> Option<&mut E> {
        let index = self.position(id)?;
        self.records.get_mut(index)
    }

    pub fn in_scope<'a>(&'a self, scope: &'a E::Scope) -> impl Iterator<Item = &'a E> + 'a {
        self.records.iter().filter(move |r| r.scope() == scope)
    }

    pub fn push(&mut self, record: E) {
        self.records.push_back(record);
    }

    /// Insert at `index`, clamped to the current length.
    pub fn insert_at(&mut self, index: usize, record: E) {
        let index = index.min(self.records.len());
        self.records.insert(index, record);
    }

    /// Remove by id, returning the former index alongside the record.
    pub fn remove(&mut self, id: &E::Id) -> Option<(usize, E)> {
        let index = self.position(id)?;
        Some((index, self.records.remove(index)))
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&E) -> bool) {
        self.records.retain(|r| keep(r));
    }

    pub fn snapshot(&self) -> EntitySnapshot<E> {
        EntitySnapshot {
            records: self.records.clone(),
        }
    }
}
