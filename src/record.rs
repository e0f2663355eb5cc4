//! Record references and caller-context resolution.
//!
//! A button can be pressed from three places: a ribbon that hands over a
//! pre-built list of references, a grid with selected rows, or a single
//! record form. Each shape is one variant of [`PrimaryControl`] and
//! [`resolve`] normalizes all of them into a [`Batch`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{FlowError, Result};

/// One unit of work: an identifier without braces plus the record's schema name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordRef {
    pub id: String,
    pub entity_name: String,
}

impl RecordRef {
    pub fn new(id: &str, entity_name: &str) -> Result<Self> {
        let id = strip_braces(id);
        if id.is_empty() {
            return Err(FlowError::InvalidRecord("empty identifier".into()));
        }
        if entity_name.trim().is_empty() {
            return Err(FlowError::InvalidRecord(format!(
                "record {id} has no type name"
            )));
        }
        Ok(Self {
            id: id.to_string(),
            entity_name: entity_name.to_string(),
        })
    }
}

/// A reference supplied by the host, as the ribbon serializes it.
#[derive(Debug, Clone, Deserialize)]
pub struct ExplicitRef {
    #[serde(alias = "Id")]
    pub id: String,
    #[serde(rename = "TypeName", alias = "typeName", alias = "entityType", default)]
    pub type_name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct GridSelection {
    pub entity_name: String,
    pub rows: Vec<String>,
}

/// The record bound to a form, with a snapshot of its field values.
#[derive(Debug, Clone, Default)]
pub struct FormRecord {
    pub id: String,
    pub entity_name: String,
    pub fields: Map<String, Value>,
}

impl FormRecord {
    pub fn field(&self, name: &str) -> Value {
        self.fields.get(name).cloned().unwrap_or(Value::Null)
    }
}

/// The caller-supplied handle whose shape decides how records are found.
#[derive(Debug, Clone)]
pub enum PrimaryControl {
    References(Vec<ExplicitRef>),
    Grid(GridSelection),
    Form(FormRecord),
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    References,
    List,
    Form,
}

impl ContextKind {
    pub fn is_list(self) -> bool {
        !matches!(self, ContextKind::Form)
    }
}

/// The records resolved for one invocation, in selection order.
#[derive(Debug, Clone)]
pub struct Batch {
    pub records: Vec<RecordRef>,
    pub entity_name: String,
    pub context: ContextKind,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

pub fn strip_braces(id: &str) -> &str {
    id.trim()
        .trim_start_matches('{')
        .trim_end_matches('}')
        .trim()
}

/// Turn the caller context into a batch. An empty batch is reported as
/// [`FlowError::NoSelection`], never as an empty `Batch`.
pub fn resolve(control: &PrimaryControl) -> Result<Batch> {
    match control {
        PrimaryControl::References(refs) if !refs.is_empty() => {
            let entity_name = refs[0].type_name.clone().unwrap_or_default();
            let records = refs
                .iter()
                .map(|r| RecordRef::new(&r.id, &entity_name))
                .collect::<Result<Vec<_>>>()?;
            Ok(Batch {
                records,
                entity_name,
                context: ContextKind::References,
            })
        }
        PrimaryControl::Grid(grid) => {
            if grid.rows.is_empty() {
                return Err(FlowError::NoSelection);
            }
            let records = grid
                .rows
                .iter()
                .map(|id| RecordRef::new(id, &grid.entity_name))
                .collect::<Result<Vec<_>>>()?;
            Ok(Batch {
                records,
                entity_name: grid.entity_name.clone(),
                context: ContextKind::List,
            })
        }
        PrimaryControl::Form(form) => Ok(Batch {
            records: vec![RecordRef::new(&form.id, &form.entity_name)?],
            entity_name: form.entity_name.clone(),
            context: ContextKind::Form,
        }),
        PrimaryControl::References(_) | PrimaryControl::Empty => Err(FlowError::NoSelection),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refs(json: &str) -> Vec<ExplicitRef> {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn type_name_accepts_all_aliases() {
        for key in ["TypeName", "typeName", "entityType"] {
            let json = format!(r#"[{{"Id":"{{A1}}","{key}":"account"}},{{"id":"b2","{key}":"account"}}]"#);
            let batch = resolve(&PrimaryControl::References(refs(&json))).unwrap();
            assert_eq!(batch.entity_name, "account", "alias {key}");
            assert_eq!(batch.records[0].id, "A1");
            assert_eq!(batch.records[1].id, "b2");
            assert_eq!(batch.context, ContextKind::References);
        }
    }

    #[test]
    fn type_name_comes_from_first_entry() {
        let json = r#"[{"Id":"1","TypeName":"contact"},{"Id":"2","TypeName":"account"}]"#;
        let batch = resolve(&PrimaryControl::References(refs(json))).unwrap();
        assert_eq!(batch.entity_name, "contact");
        assert!(batch.records.iter().all(|r| r.entity_name == "contact"));
    }

    #[test]
    fn empty_grid_selection_is_no_selection() {
        let control = PrimaryControl::Grid(GridSelection {
            entity_name: "account".into(),
            rows: vec![],
        });
        assert!(matches!(resolve(&control), Err(FlowError::NoSelection)));
    }

    #[test]
    fn empty_reference_list_and_empty_control_are_no_selection() {
        assert!(matches!(
            resolve(&PrimaryControl::References(vec![])),
            Err(FlowError::NoSelection)
        ));
        assert!(matches!(
            resolve(&PrimaryControl::Empty),
            Err(FlowError::NoSelection)
        ));
    }

    #[test]
    fn grid_keeps_selection_order() {
        let control = PrimaryControl::Grid(GridSelection {
            entity_name: "account".into(),
            rows: vec!["c".into(), "a".into(), "b".into()],
        });
        let batch = resolve(&control).unwrap();
        let ids: Vec<_> = batch.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["c", "a", "b"]);
        assert_eq!(batch.context, ContextKind::List);
    }

    #[test]
    fn form_strips_braces() {
        let control = PrimaryControl::Form(FormRecord {
            id: "{0000-1111}".into(),
            entity_name: "incident".into(),
            fields: Map::new(),
        });
        let batch = resolve(&control).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.records[0].id, "0000-1111");
        assert_eq!(batch.context, ContextKind::Form);
    }

    #[test]
    fn missing_type_name_is_rejected() {
        let json = r#"[{"Id":"1"}]"#;
        assert!(matches!(
            resolve(&PrimaryControl::References(refs(json))),
            Err(FlowError::InvalidRecord(_))
        ));
    }
}
