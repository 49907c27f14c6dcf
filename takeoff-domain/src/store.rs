use std::collections::HashMap;
use takeoff_types::{Element, ElementId};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("duplicate element id `{0}`")]
    DuplicateId(ElementId),
}

/// In-memory collection of elements for one project, indexed by id and type.
///
/// Type lookups are case-insensitive; element order is insertion order.
#[derive(Debug, Clone, Default)]
pub struct EntityStore {
    elements: Vec<Element>,
    by_id: HashMap<ElementId, usize>,
    by_type: HashMap<String, Vec<usize>>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_elements(elements: Vec<Element>) -> Result<Self, StoreError> {
        let mut store = Self::new();
        for element in elements {
            store.insert(element)?;
        }
        Ok(store)
    }

    pub fn insert(&mut self, element: Element) -> Result<(), StoreError> {
        if self.by_id.contains_key(&element.id) {
            return Err(StoreError::DuplicateId(element.id));
        }
        let idx = self.elements.len();
        self.by_id.insert(element.id.clone(), idx);
        self.by_type
            .entry(type_key(&element.entity_type))
            .or_default()
            .push(idx);
        self.elements.push(element);
        Ok(())
    }

    pub fn get(&self, id: &ElementId) -> Option<&Element> {
        self.by_id.get(id).map(|&i| &self.elements[i])
    }

    /// Mutable access for in-place repair.
    ///
    /// Callers must not change `id` or `entity_type`; the indexes are not rebuilt.
    pub fn get_mut(&mut self, id: &ElementId) -> Option<&mut Element> {
        match self.by_id.get(id) {
            Some(&i) => self.elements.get_mut(i),
            None => None,
        }
    }

    /// Elements of one type, in store order.
    pub fn of_type<'s>(
        &'s self,
        entity_type: &str,
    ) -> impl Iterator<Item = &'s Element> + use<'s> {
        self.by_type
            .get(&type_key(entity_type))
            .into_iter()
            .flatten()
            .map(|&i| &self.elements[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Element> {
        self.elements.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &ElementId> {
        self.elements.iter().map(|e| &e.id)
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn into_elements(self) -> Vec<Element> {
        self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

fn type_key(entity_type: &str) -> String {
    entity_type.to_ascii_lowercase()
}
