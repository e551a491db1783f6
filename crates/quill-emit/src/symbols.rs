//! Symbol tables for labels and locals
//!
//! Both tables hand out dense, creation-ordered ordinals: the n-th symbol
//! created has ordinal n. Entries are never removed, so an ordinal is a
//! stable identity for the lifetime of the stream that owns the table.

use crate::error::{EmitError, EmitResult, SymbolKind};
use crate::metadata::TypeRef;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Highest ordinal a local slot can have
pub const MAX_LOCAL_ORDINAL: usize = 0xFFFE;

/// Highest label ordinal that still selects short branch forms
pub const SHORT_LABEL_ORDINAL: usize = 127;

/// Highest local ordinal that fits the one-byte index forms
pub const SHORT_LOCAL_ORDINAL: usize = 255;

/// A jump target whose position is not fixed yet
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Label {
    ordinal: usize,
    name: Arc<str>,
}

impl Label {
    pub(crate) fn new(ordinal: usize, name: impl Into<Arc<str>>) -> Self {
        Self {
            ordinal,
            name: name.into(),
        }
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether branches to this label use the one-byte displacement forms.
    ///
    /// Keyed off the creation ordinal, not the distance to the target.
    pub fn is_short_form(&self) -> bool {
        self.ordinal <= SHORT_LABEL_ORDINAL
    }

    /// Same label with its display name dropped
    pub(crate) fn anonymized(&self) -> Self {
        Self::new(self.ordinal, "")
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Anything that describes a local slot: ours, or a sink's own slot object
pub trait LocalSlot {
    fn slot_ordinal(&self) -> usize;
    fn slot_type(&self) -> &TypeRef;
    fn slot_pinned(&self) -> bool;
}

/// A storage slot private to the routine being assembled
///
/// Equality ignores the display name.
#[derive(Debug, Clone)]
pub struct Local {
    ordinal: usize,
    value_type: TypeRef,
    pinned: bool,
    name: Arc<str>,
}

impl Local {
    pub(crate) fn new(
        ordinal: usize,
        value_type: TypeRef,
        pinned: bool,
        name: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            ordinal,
            value_type,
            pinned,
            name: name.into(),
        }
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn value_type(&self) -> &TypeRef {
        &self.value_type
    }

    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_short_form(&self) -> bool {
        self.ordinal <= SHORT_LOCAL_ORDINAL
    }

    /// Loose comparison against any slot description (ordinal, type, pinned)
    pub fn same_slot(&self, other: &impl LocalSlot) -> bool {
        self.ordinal == other.slot_ordinal()
            && &self.value_type == other.slot_type()
            && self.pinned == other.slot_pinned()
    }
}

impl PartialEq for Local {
    fn eq(&self, other: &Self) -> bool {
        self.ordinal == other.ordinal
            && self.value_type == other.value_type
            && self.pinned == other.pinned
    }
}

impl Eq for Local {}

impl Hash for Local {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ordinal.hash(state);
        self.value_type.hash(state);
        self.pinned.hash(state);
    }
}

impl LocalSlot for Local {
    fn slot_ordinal(&self) -> usize {
        self.ordinal
    }

    fn slot_type(&self) -> &TypeRef {
        &self.value_type
    }

    fn slot_pinned(&self) -> bool {
        self.pinned
    }
}

impl fmt::Display for Local {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Debug, Clone)]
struct LabelEntry {
    label: Label,
    marked_at: Option<usize>,
}

/// Registry of the labels defined on one stream
#[derive(Debug, Clone, Default)]
pub struct LabelTable {
    entries: Vec<LabelEntry>,
}

impl LabelTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The label the next `insert` will accept
    pub(crate) fn next(&self, name: Option<&str>, prefix: &str) -> Label {
        let ordinal = self.entries.len();
        match name {
            Some(name) => Label::new(ordinal, name),
            None => Label::new(ordinal, format!("{prefix}{ordinal}")),
        }
    }

    pub(crate) fn insert(&mut self, label: Label) {
        debug_assert_eq!(label.ordinal, self.entries.len());
        self.entries.push(LabelEntry {
            label,
            marked_at: None,
        });
    }

    /// Create and register a label in one step
    pub fn create(&mut self, name: Option<&str>, prefix: &str) -> Label {
        let label = self.next(name, prefix);
        self.insert(label.clone());
        label
    }

    pub fn get(&self, ordinal: usize) -> Option<&Label> {
        self.entries.get(ordinal).map(|entry| &entry.label)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Label> {
        self.entries.iter().map(|entry| &entry.label)
    }

    /// Check that `label` was created by this table
    pub fn validate(&self, label: &Label) -> EmitResult<()> {
        match self.entries.get(label.ordinal) {
            None => Err(invalid_label(label, "not defined on this stream")),
            Some(entry) if entry.label != *label => {
                Err(invalid_label(label, "belongs to a different stream"))
            }
            Some(_) => Ok(()),
        }
    }

    /// Check that `label` is the one `insert` expects next
    pub(crate) fn validate_next(&self, label: &Label) -> EmitResult<()> {
        if label.ordinal == self.entries.len() {
            Ok(())
        } else {
            Err(invalid_label(label, "ordinal does not continue the table"))
        }
    }

    /// Check that `label` can still be marked
    pub(crate) fn validate_unmarked(&self, label: &Label) -> EmitResult<()> {
        self.validate(label)?;
        match self.position(label) {
            Some(offset) => Err(EmitError::LabelAlreadyMarked {
                name: label.name().to_string(),
                offset,
            }),
            None => Ok(()),
        }
    }

    pub(crate) fn mark(&mut self, label: &Label, offset: usize) {
        if let Some(entry) = self.entries.get_mut(label.ordinal) {
            entry.marked_at = Some(offset);
        }
    }

    pub fn is_marked(&self, label: &Label) -> bool {
        self.position(label).is_some()
    }

    /// Stream offset the label was marked at
    pub fn position(&self, label: &Label) -> Option<usize> {
        self.entries
            .get(label.ordinal)
            .and_then(|entry| entry.marked_at)
    }

    /// Labels that were defined but never marked
    pub fn unmarked(&self) -> impl Iterator<Item = &Label> {
        self.entries
            .iter()
            .filter(|entry| entry.marked_at.is_none())
            .map(|entry| &entry.label)
    }
}

fn invalid_label(label: &Label, reason: &'static str) -> EmitError {
    EmitError::InvalidSymbol {
        kind: SymbolKind::Label,
        ordinal: label.ordinal,
        name: label.name().to_string(),
        reason,
    }
}

/// Registry of the locals declared on one stream
#[derive(Debug, Clone, Default)]
pub struct LocalTable {
    entries: Vec<Local>,
}

impl LocalTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The local the next `insert` will accept
    pub(crate) fn next(
        &self,
        value_type: TypeRef,
        pinned: bool,
        name: Option<&str>,
        prefix: &str,
    ) -> EmitResult<Local> {
        let ordinal = self.entries.len();
        if ordinal > MAX_LOCAL_ORDINAL {
            return Err(EmitError::out_of_range(
                "local ordinal",
                ordinal,
                "0..=65534",
            ));
        }
        let local = match name {
            Some(name) => Local::new(ordinal, value_type, pinned, name),
            None => Local::new(ordinal, value_type, pinned, format!("{prefix}{ordinal}")),
        };
        Ok(local)
    }

    pub(crate) fn insert(&mut self, local: Local) {
        debug_assert_eq!(local.ordinal, self.entries.len());
        self.entries.push(local);
    }

    /// Create and register a local in one step
    pub fn create(
        &mut self,
        value_type: TypeRef,
        pinned: bool,
        name: Option<&str>,
        prefix: &str,
    ) -> EmitResult<Local> {
        let local = self.next(value_type, pinned, name, prefix)?;
        self.insert(local.clone());
        Ok(local)
    }

    pub fn get(&self, ordinal: usize) -> Option<&Local> {
        self.entries.get(ordinal)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Local> {
        self.entries.iter()
    }

    /// Check that `local` was declared by this table
    pub fn validate(&self, local: &Local) -> EmitResult<()> {
        match self.entries.get(local.ordinal) {
            None => Err(invalid_local(local, "not declared on this stream")),
            Some(entry) if entry != local => {
                Err(invalid_local(local, "belongs to a different stream"))
            }
            Some(_) => Ok(()),
        }
    }

    pub(crate) fn validate_next(&self, local: &Local) -> EmitResult<()> {
        if local.ordinal == self.entries.len() {
            Ok(())
        } else {
            Err(invalid_local(local, "ordinal does not continue the table"))
        }
    }
}

fn invalid_local(local: &Local, reason: &'static str) -> EmitError {
    EmitError::InvalidSymbol {
        kind: SymbolKind::Local,
        ordinal: local.ordinal,
        name: local.name().to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::TypeCode;

    fn int32() -> TypeRef {
        TypeRef::primitive(TypeCode::Int32)
    }

    #[test]
    fn test_label_ordinals_are_dense() {
        let mut table = LabelTable::new();
        let labels: Vec<_> = (0..5).map(|_| table.create(None, "Label")).collect();
        let ordinals: Vec<_> = labels.iter().map(Label::ordinal).collect();
        assert_eq!(ordinals, vec![0, 1, 2, 3, 4]);
        assert_eq!(labels[3].name(), "Label3");
        assert_eq!(table.len(), 5);
    }

    #[test]
    fn test_label_short_form_follows_ordinal() {
        assert!(Label::new(0, "a").is_short_form());
        assert!(Label::new(127, "a").is_short_form());
        assert!(!Label::new(128, "a").is_short_form());
    }

    #[test]
    fn test_label_validation() {
        let mut table = LabelTable::new();
        let start = table.create(Some("start"), "Label");
        assert!(table.validate(&start).is_ok());

        let mut other = LabelTable::new();
        let foreign = other.create(Some("elsewhere"), "Label");
        let err = table.validate(&foreign).unwrap_err();
        assert!(err.is_invalid_symbol());

        let missing = Label::new(7, "Label7");
        assert!(table.validate(&missing).is_err());
    }

    #[test]
    fn test_label_marking() {
        let mut table = LabelTable::new();
        let end = table.create(None, "Label");
        assert!(!table.is_marked(&end));
        assert!(table.validate_unmarked(&end).is_ok());

        table.mark(&end, 12);
        assert!(table.is_marked(&end));
        assert_eq!(table.position(&end), Some(12));
        match table.validate_unmarked(&end) {
            Err(EmitError::LabelAlreadyMarked { offset, .. }) => assert_eq!(offset, 12),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(table.unmarked().count(), 0);
    }

    #[test]
    fn test_local_ordinals_and_short_form() {
        let mut table = LocalTable::new();
        for expected in 0..300 {
            let local = table.create(int32(), false, None, "Local").unwrap();
            assert_eq!(local.ordinal(), expected);
        }
        assert!(table.get(255).unwrap().is_short_form());
        assert!(!table.get(256).unwrap().is_short_form());
    }

    #[test]
    fn test_local_equality_ignores_name() {
        let a = Local::new(2, int32(), false, "sum");
        let b = Local::new(2, int32(), false, "Local2");
        let pinned = Local::new(2, int32(), true, "sum");
        assert_eq!(a, b);
        assert_ne!(a, pinned);
        assert!(a.same_slot(&b));
        assert!(!a.same_slot(&pinned));
    }

    #[test]
    fn test_local_validation() {
        let mut table = LocalTable::new();
        let sum = table.create(int32(), false, Some("sum"), "Local").unwrap();
        assert!(table.validate(&sum).is_ok());

        let impostor = Local::new(0, TypeRef::primitive(TypeCode::Int64), false, "sum");
        assert!(table.validate(&impostor).is_err());
        let beyond = Local::new(4, int32(), false, "x");
        assert!(table.validate(&beyond).is_err());
    }

    #[test]
    fn test_next_does_not_register() {
        let table = LocalTable::new();
        let local = table.next(int32(), false, None, "V_").unwrap();
        assert_eq!(local.name(), "V_0");
        assert!(table.is_empty());
        assert!(table.validate_next(&local).is_ok());
    }
}
