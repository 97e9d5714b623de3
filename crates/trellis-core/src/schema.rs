//! Graph element schema.
//!
//! Every node and edge kind the system writes is a variant of [`ElementType`],
//! backed by a static [`ElementSchema`] that declares its type tag, required
//! fields and the indexes its fields are written to. Property bags are
//! validated here before anything is sent to the graph store.

use serde_json::Value;
use thiserror::Error;

use crate::graph::{IndexConfig, IndexKind, PropertyMap};

// ============================================================================
// Field names
// ============================================================================

pub const NODE_TYPE_FIELD: &str = "_TRL_NODE_TYPE";
pub const UNIQUE_NODE_ID_FIELD: &str = "_TRL_UNQ_NODE_ID";
pub const UNIQUE_EDGE_ID_FIELD: &str = "_TRL_UNQ_EDGE_ID";
pub const WORKSPACE_ID_FIELD: &str = "_TRL_WORKSPACE_ID";
pub const USER_ID_FIELD: &str = "_TRL_USER_ID";
pub const CREATION_DATE_FIELD: &str = "_TRL_CREATION_DATE";
pub const CATEGORY_NAME_FIELD: &str = "_TRL_CAT_NAME";
pub const CATEGORY_DESC_FIELD: &str = "_TRL_CAT_DESC";
pub const COMMENT_SUBJECT_FIELD: &str = "_TRL_COM_SUBJ";
pub const COMMENT_BODY_FIELD: &str = "_TRL_COM_BODY";
pub const WRITEUP_TITLE_FIELD: &str = "_TRL_WRUP_TITLE";
pub const WRITEUP_BODY_FIELD: &str = "_TRL_WRUP_BODY";

// ============================================================================
// Index names
// ============================================================================

pub const UNIQUE_NODE_ID_INDEX: &str = "UNQ_NODE_ID_IDX";
pub const UNIQUE_EDGE_ID_INDEX: &str = "UNQ_EDGE_ID_IDX";
pub const WORKSPACE_INDEX: &str = "WORKSPACE_IDX";
pub const USER_INDEX: &str = "USER_IDX";
pub const CREATED_BY_INDEX: &str = "CREATED_BY_IDX";
pub const CATEGORY_INDEX: &str = "CATEGORY_IDX";
pub const COMMENT_INDEX: &str = "COMMENT_IDX";
pub const WRITEUP_INDEX: &str = "WRITEUP_IDX";

/// An index the graph store must have before elements are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexDecl {
    pub kind: IndexKind,
    pub name: &'static str,
    pub fulltext: bool,
}

impl IndexDecl {
    pub fn config(&self) -> Option<IndexConfig> {
        self.fulltext.then(IndexConfig::fulltext)
    }
}

/// Every index the element schemas write to.
pub const DECLARED_INDEXES: &[IndexDecl] = &[
    IndexDecl { kind: IndexKind::Node, name: UNIQUE_NODE_ID_INDEX, fulltext: false },
    IndexDecl { kind: IndexKind::Node, name: WORKSPACE_INDEX, fulltext: false },
    IndexDecl { kind: IndexKind::Node, name: USER_INDEX, fulltext: false },
    IndexDecl { kind: IndexKind::Node, name: CATEGORY_INDEX, fulltext: true },
    IndexDecl { kind: IndexKind::Node, name: COMMENT_INDEX, fulltext: true },
    IndexDecl { kind: IndexKind::Node, name: WRITEUP_INDEX, fulltext: true },
    IndexDecl { kind: IndexKind::Edge, name: UNIQUE_EDGE_ID_INDEX, fulltext: false },
    IndexDecl { kind: IndexKind::Edge, name: CREATED_BY_INDEX, fulltext: false },
];

// ============================================================================
// Type tags and edge labels
// ============================================================================

pub const WORKSPACE_TYPE_TAG: &str = "WORKSPACE";
pub const USER_TYPE_TAG: &str = "USER";
pub const ROOT_CATEGORY_TYPE_TAG: &str = "ROOT_CATEGORY";
pub const CATEGORY_TYPE_TAG: &str = "CATEGORY";
pub const COMMENT_TYPE_TAG: &str = "COMMENT";
pub const WRITEUP_TYPE_TAG: &str = "WRITEUP";

pub mod edge_labels {
    pub const IS_ROOT_CAT_FOR: &str = "IS_ROOT_CAT_FOR";
    pub const CREATED_BY: &str = "CREATED_BY";
    pub const HAS_PARENT_CAT: &str = "HAS_PARENT_CAT";
    pub const BELONGS_TO_CAT: &str = "BELONGS_TO_CAT";
    pub const HAS_PARENT_COMMENT: &str = "HAS_PARENT_COMMENT";
    pub const COMMENTS_ON: &str = "COMMENTS_ON";

    /// Labels followed upward from content to its workspace.
    pub const CONTAINMENT: &[&str] = &[
        HAS_PARENT_COMMENT,
        COMMENTS_ON,
        BELONGS_TO_CAT,
        HAS_PARENT_CAT,
        IS_ROOT_CAT_FOR,
    ];
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("{element} is missing required field {field}")]
    MissingRequiredField {
        element: &'static str,
        field: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Node,
    Edge,
}

/// Static declaration of one element kind.
#[derive(Debug)]
pub struct ElementSchema {
    pub kind: ElementKind,
    /// Node type tag, or edge label
    pub type_tag: &'static str,
    pub required_fields: &'static [&'static str],
    /// `(index name, fields written to it)`
    pub index_fields: &'static [(&'static str, &'static [&'static str])],
}

const NODE_BASE_INDEX: (&str, &[&str]) = (UNIQUE_NODE_ID_INDEX, &[UNIQUE_NODE_ID_FIELD]);
const EDGE_BASE_INDEX: (&str, &[&str]) = (UNIQUE_EDGE_ID_INDEX, &[UNIQUE_EDGE_ID_FIELD]);

static WORKSPACE_SCHEMA: ElementSchema = ElementSchema {
    kind: ElementKind::Node,
    type_tag: WORKSPACE_TYPE_TAG,
    required_fields: &[NODE_TYPE_FIELD, UNIQUE_NODE_ID_FIELD, WORKSPACE_ID_FIELD],
    index_fields: &[NODE_BASE_INDEX, (WORKSPACE_INDEX, &[WORKSPACE_ID_FIELD])],
};

static USER_SCHEMA: ElementSchema = ElementSchema {
    kind: ElementKind::Node,
    type_tag: USER_TYPE_TAG,
    required_fields: &[NODE_TYPE_FIELD, UNIQUE_NODE_ID_FIELD, USER_ID_FIELD],
    index_fields: &[NODE_BASE_INDEX, (USER_INDEX, &[USER_ID_FIELD])],
};

static ROOT_CATEGORY_SCHEMA: ElementSchema = ElementSchema {
    kind: ElementKind::Node,
    type_tag: ROOT_CATEGORY_TYPE_TAG,
    required_fields: &[
        NODE_TYPE_FIELD,
        UNIQUE_NODE_ID_FIELD,
        WORKSPACE_ID_FIELD,
        CATEGORY_NAME_FIELD,
    ],
    index_fields: &[NODE_BASE_INDEX, (WORKSPACE_INDEX, &[WORKSPACE_ID_FIELD])],
};

static CATEGORY_SCHEMA: ElementSchema = ElementSchema {
    kind: ElementKind::Node,
    type_tag: CATEGORY_TYPE_TAG,
    required_fields: &[
        NODE_TYPE_FIELD,
        UNIQUE_NODE_ID_FIELD,
        CATEGORY_NAME_FIELD,
        CATEGORY_DESC_FIELD,
        CREATION_DATE_FIELD,
    ],
    index_fields: &[
        NODE_BASE_INDEX,
        (CATEGORY_INDEX, &[CATEGORY_NAME_FIELD, CATEGORY_DESC_FIELD]),
    ],
};

static COMMENT_SCHEMA: ElementSchema = ElementSchema {
    kind: ElementKind::Node,
    type_tag: COMMENT_TYPE_TAG,
    required_fields: &[
        NODE_TYPE_FIELD,
        UNIQUE_NODE_ID_FIELD,
        COMMENT_SUBJECT_FIELD,
        COMMENT_BODY_FIELD,
        CREATION_DATE_FIELD,
    ],
    index_fields: &[
        NODE_BASE_INDEX,
        (COMMENT_INDEX, &[COMMENT_SUBJECT_FIELD, COMMENT_BODY_FIELD]),
    ],
};

static WRITEUP_SCHEMA: ElementSchema = ElementSchema {
    kind: ElementKind::Node,
    type_tag: WRITEUP_TYPE_TAG,
    required_fields: &[
        NODE_TYPE_FIELD,
        UNIQUE_NODE_ID_FIELD,
        WRITEUP_TITLE_FIELD,
        WRITEUP_BODY_FIELD,
        CREATION_DATE_FIELD,
    ],
    index_fields: &[
        NODE_BASE_INDEX,
        (WRITEUP_INDEX, &[WRITEUP_TITLE_FIELD, WRITEUP_BODY_FIELD]),
    ],
};

static CREATED_BY_SCHEMA: ElementSchema = ElementSchema {
    kind: ElementKind::Edge,
    type_tag: edge_labels::CREATED_BY,
    required_fields: &[UNIQUE_EDGE_ID_FIELD, USER_ID_FIELD, CREATION_DATE_FIELD],
    index_fields: &[EDGE_BASE_INDEX, (CREATED_BY_INDEX, &[USER_ID_FIELD])],
};

macro_rules! plain_edge_schema {
    ($name:ident, $label:expr) => {
        static $name: ElementSchema = ElementSchema {
            kind: ElementKind::Edge,
            type_tag: $label,
            required_fields: &[UNIQUE_EDGE_ID_FIELD],
            index_fields: &[EDGE_BASE_INDEX],
        };
    };
}

plain_edge_schema!(IS_ROOT_CAT_FOR_SCHEMA, edge_labels::IS_ROOT_CAT_FOR);
plain_edge_schema!(HAS_PARENT_CAT_SCHEMA, edge_labels::HAS_PARENT_CAT);
plain_edge_schema!(BELONGS_TO_CAT_SCHEMA, edge_labels::BELONGS_TO_CAT);
plain_edge_schema!(HAS_PARENT_COMMENT_SCHEMA, edge_labels::HAS_PARENT_COMMENT);
plain_edge_schema!(COMMENTS_ON_SCHEMA, edge_labels::COMMENTS_ON);

/// Every node and edge kind the system writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    Workspace,
    User,
    RootCategory,
    Category,
    Comment,
    Writeup,
    IsRootCatFor,
    CreatedBy,
    HasParentCat,
    BelongsToCat,
    HasParentComment,
    CommentsOn,
}

impl ElementType {
    pub const ALL: [ElementType; 12] = [
        ElementType::Workspace,
        ElementType::User,
        ElementType::RootCategory,
        ElementType::Category,
        ElementType::Comment,
        ElementType::Writeup,
        ElementType::IsRootCatFor,
        ElementType::CreatedBy,
        ElementType::HasParentCat,
        ElementType::BelongsToCat,
        ElementType::HasParentComment,
        ElementType::CommentsOn,
    ];

    pub fn schema(&self) -> &'static ElementSchema {
        match self {
            ElementType::Workspace => &WORKSPACE_SCHEMA,
            ElementType::User => &USER_SCHEMA,
            ElementType::RootCategory => &ROOT_CATEGORY_SCHEMA,
            ElementType::Category => &CATEGORY_SCHEMA,
            ElementType::Comment => &COMMENT_SCHEMA,
            ElementType::Writeup => &WRITEUP_SCHEMA,
            ElementType::IsRootCatFor => &IS_ROOT_CAT_FOR_SCHEMA,
            ElementType::CreatedBy => &CREATED_BY_SCHEMA,
            ElementType::HasParentCat => &HAS_PARENT_CAT_SCHEMA,
            ElementType::BelongsToCat => &BELONGS_TO_CAT_SCHEMA,
            ElementType::HasParentComment => &HAS_PARENT_COMMENT_SCHEMA,
            ElementType::CommentsOn => &COMMENTS_ON_SCHEMA,
        }
    }

    /// Look up a node kind by type tag or an edge kind by label.
    pub fn from_type_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.type_tag() == tag)
    }

    pub fn kind(&self) -> ElementKind {
        self.schema().kind
    }

    pub fn type_tag(&self) -> &'static str {
        self.schema().type_tag
    }

    pub fn required_fields(&self) -> &'static [&'static str] {
        self.schema().required_fields
    }

    pub fn index_fields(&self) -> &'static [(&'static str, &'static [&'static str])] {
        self.schema().index_fields
    }

    pub fn unique_id_field(&self) -> &'static str {
        match self.kind() {
            ElementKind::Node => UNIQUE_NODE_ID_FIELD,
            ElementKind::Edge => UNIQUE_EDGE_ID_FIELD,
        }
    }

    /// Check that every required field is present and non-null.
    pub fn validate(&self, props: &PropertyMap) -> Result<(), SchemaError> {
        self.check_required(props, &[])
    }

    /// Validate only the fields the caller must supply, before an ID exists.
    pub fn validate_caller_fields(&self, props: &PropertyMap) -> Result<(), SchemaError> {
        self.check_required(props, &[NODE_TYPE_FIELD, self.unique_id_field()])
    }

    fn check_required(&self, props: &PropertyMap, skip: &[&str]) -> Result<(), SchemaError> {
        for &field in self.required_fields() {
            if skip.contains(&field) {
                continue;
            }
            match props.get(field) {
                Some(value) if !value.is_null() => {}
                _ => {
                    return Err(SchemaError::MissingRequiredField {
                        element: self.type_tag(),
                        field,
                    })
                }
            }
        }
        Ok(())
    }

    /// Merge the system fields (type tag, unique ID) into `props` and validate.
    pub fn assemble_for_create(
        &self,
        unique_id: i64,
        mut props: PropertyMap,
    ) -> Result<GraphElement, SchemaError> {
        if self.kind() == ElementKind::Node {
            props.insert(NODE_TYPE_FIELD.to_string(), Value::from(self.type_tag()));
        }
        props.insert(self.unique_id_field().to_string(), Value::from(unique_id));
        self.validate(&props)?;
        Ok(GraphElement {
            element_type: *self,
            properties: props,
        })
    }

    /// `{index name: [fields]}` as the helper library expects it.
    pub fn fields_to_index(&self) -> PropertyMap {
        self.index_fields()
            .iter()
            .map(|(index, fields)| {
                (
                    index.to_string(),
                    Value::Array(fields.iter().map(|f| Value::from(*f)).collect()),
                )
            })
            .collect()
    }
}

/// A validated node or edge ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphElement {
    pub element_type: ElementType,
    pub properties: PropertyMap,
}

impl GraphElement {
    pub fn unique_id(&self) -> Option<i64> {
        self.properties
            .get(self.element_type.unique_id_field())
            .and_then(Value::as_i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(value: Value) -> PropertyMap {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_assemble_node_adds_system_fields() {
        let element = ElementType::Workspace
            .assemble_for_create(11, props(json!({ "_TRL_WORKSPACE_ID": 3 })))
            .unwrap();
        assert_eq!(element.properties[NODE_TYPE_FIELD], json!("WORKSPACE"));
        assert_eq!(element.unique_id(), Some(11));
    }

    #[test]
    fn test_assemble_edge_has_no_type_field() {
        let element = ElementType::HasParentCat
            .assemble_for_create(4, PropertyMap::new())
            .unwrap();
        assert!(!element.properties.contains_key(NODE_TYPE_FIELD));
        assert_eq!(element.properties[UNIQUE_EDGE_ID_FIELD], json!(4));
    }

    #[test]
    fn test_missing_required_field() {
        let err = ElementType::Category
            .assemble_for_create(
                1,
                props(json!({ "_TRL_CAT_NAME": "soil", "_TRL_CREATION_DATE": "2024-01-01T00:00:00Z" })),
            )
            .unwrap_err();
        assert_eq!(
            err,
            SchemaError::MissingRequiredField {
                element: "CATEGORY",
                field: CATEGORY_DESC_FIELD
            }
        );
    }

    #[test]
    fn test_null_counts_as_missing() {
        let err = ElementType::User
            .validate(&props(json!({
                "_TRL_NODE_TYPE": "USER",
                "_TRL_UNQ_NODE_ID": 1,
                "_TRL_USER_ID": null
            })))
            .unwrap_err();
        assert!(matches!(err, SchemaError::MissingRequiredField { field, .. } if field == USER_ID_FIELD));
    }

    #[test]
    fn test_fields_to_index_shape() {
        let fields = ElementType::CreatedBy.fields_to_index();
        assert_eq!(fields["UNQ_EDGE_ID_IDX"], json!(["_TRL_UNQ_EDGE_ID"]));
        assert_eq!(fields["CREATED_BY_IDX"], json!(["_TRL_USER_ID"]));
    }

    #[test]
    fn test_every_index_written_is_declared() {
        for element in ElementType::ALL {
            for (index, _) in element.index_fields() {
                assert!(
                    DECLARED_INDEXES.iter().any(|d| d.name == *index),
                    "{} writes to undeclared index {}",
                    element.type_tag(),
                    index
                );
            }
        }
    }

    #[test]
    fn test_type_tag_lookup() {
        assert_eq!(ElementType::from_type_tag("COMMENTS_ON"), Some(ElementType::CommentsOn));
        assert_eq!(ElementType::from_type_tag("WRITEUP"), Some(ElementType::Writeup));
        assert_eq!(ElementType::from_type_tag("nope"), None);
    }
}
