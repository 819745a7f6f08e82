//! Core type definitions: models, rows, users and actions.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// An entity class identifier (e.g., "Container", "Invoice").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModelType(String);

impl ModelType {
    /// Creates a new ModelType, validating the name.
    pub fn new(value: impl Into<String>) -> Result<Self, &'static str> {
        let value = value.into();
        if value.is_empty() {
            return Err("model type cannot be empty");
        }
        if value.contains(|c: char| c.is_whitespace() || c == '.') {
            return Err("model type cannot contain whitespace or '.'");
        }
        Ok(Self(value))
    }

    /// Returns the model name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercase name used as the suffix of permission codenames.
    pub fn codename_suffix(&self) -> String {
        self.0.to_lowercase()
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Primary key of a row.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ObjectId(pub i64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of an authenticated user.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The requesting user. Anonymous users carry no identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct User {
    id: Option<UserId>,
}

impl User {
    /// An unauthenticated user.
    pub fn anonymous() -> Self {
        Self { id: None }
    }

    /// An authenticated user with the given identity.
    pub fn authenticated(id: UserId) -> Self {
        Self { id: Some(id) }
    }

    pub fn id(&self) -> Option<UserId> {
        self.id
    }

    pub fn is_anonymous(&self) -> bool {
        self.id.is_none()
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            Some(id) => write!(f, "user:{id}"),
            None => f.write_str("anonymous"),
        }
    }
}

/// A column value on a row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Interprets the value as a foreign key.
    pub fn as_object_id(&self) -> Option<ObjectId> {
        match self {
            Value::Int(id) => Some(ObjectId(*id)),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<ObjectId> for Value {
    fn from(value: ObjectId) -> Self {
        Value::Int(value.0)
    }
}

impl From<UserId> for Value {
    fn from(value: UserId) -> Self {
        Value::Int(value.0)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Text(s) => write!(f, "{s:?}"),
        }
    }
}

/// A snapshot of one row of a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Object {
    pub model: ModelType,
    pub id: ObjectId,
    pub fields: BTreeMap<String, Value>,
}

static NULL: Value = Value::Null;

impl Object {
    /// Creates a row with no field values.
    pub fn new(model: ModelType, id: ObjectId) -> Self {
        Self {
            model,
            id,
            fields: BTreeMap::new(),
        }
    }

    /// Sets a field value, returning the row.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Returns the field value, or `Null` if the field is not set.
    pub fn field(&self, name: &str) -> &Value {
        self.fields.get(name).unwrap_or(&NULL)
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.model, self.id)
    }
}

/// The kind of operation being authorized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Action {
    View,
    Create,
    Change,
    Delete,
    Custom(String),
}

impl Action {
    /// Maps an endpoint operation to the action it requires.
    ///
    /// Unknown operations pass through unchanged as [`Action::Custom`].
    pub fn from_operation(operation: &str) -> Self {
        match operation {
            "list" | "retrieve" | "view" => Action::View,
            "update" | "partial_update" | "change" => Action::Change,
            "destroy" | "delete" => Action::Delete,
            "create" | "add" => Action::Create,
            other => Action::Custom(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Action::View => "view",
            Action::Create => "create",
            Action::Change => "change",
            Action::Delete => "delete",
            Action::Custom(name) => name,
        }
    }

    /// Permission codename for this action on a model, e.g. `view_container`.
    pub fn codename(&self, model: &ModelType) -> String {
        let prefix = match self {
            Action::Create => "add",
            other => other.as_str(),
        };
        format!("{}_{}", prefix, model.codename_suffix())
    }
}

impl FromStr for Action {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Action::from_operation(s))
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A dotted path to a field, traversing relations (e.g. `parent.owner`).
///
/// Always holds at least one segment; deserialization goes through
/// [`FieldPath::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    /// Parses `a.b.c` or `a__b__c`.
    pub fn parse(value: &str) -> Result<Self, &'static str> {
        if value.is_empty() {
            return Err("field path cannot be empty");
        }
        if value.contains("__") && value.contains('.') {
            return Err("field path cannot mix '.' and '__' separators");
        }
        let segments: Vec<String> = if value.contains("__") {
            value.split("__").map(str::to_string).collect()
        } else {
            value.split('.').map(str::to_string).collect()
        };
        if segments.iter().any(|s| s.is_empty()) {
            return Err("field path segments cannot be empty");
        }
        Ok(Self(segments))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Relation segments leading to the final field.
    pub fn relations(&self) -> &[String] {
        &self.0[..self.0.len() - 1]
    }

    /// The final (plain) field name.
    pub fn field(&self) -> &str {
        &self.0[self.0.len() - 1]
    }
}

impl TryFrom<String> for FieldPath {
    type Error = &'static str;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<FieldPath> for String {
    fn from(path: FieldPath) -> Self {
        path.to_string()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_type_creation() {
        let model = ModelType::new("Container").unwrap();
        assert_eq!(model.as_str(), "Container");
        assert_eq!(model.codename_suffix(), "container");
    }

    #[test]
    fn test_model_type_invalid() {
        assert!(ModelType::new("").is_err());
        assert!(ModelType::new("Item A").is_err());
        assert!(ModelType::new("app.Item").is_err());
    }

    #[test]
    fn test_anonymous_user_has_no_id() {
        let user = User::anonymous();
        assert!(user.is_anonymous());
        assert_eq!(user.id(), None);
        assert_eq!(user.to_string(), "anonymous");

        let user = User::authenticated(UserId(7));
        assert!(!user.is_anonymous());
        assert_eq!(user.to_string(), "user:7");
    }

    #[test]
    fn test_operation_to_action_table() {
        assert_eq!(Action::from_operation("retrieve"), Action::View);
        assert_eq!(Action::from_operation("list"), Action::View);
        assert_eq!(Action::from_operation("update"), Action::Change);
        assert_eq!(Action::from_operation("partial_update"), Action::Change);
        assert_eq!(Action::from_operation("destroy"), Action::Delete);
        assert_eq!(Action::from_operation("create"), Action::Create);
        assert_eq!(
            Action::from_operation("archive"),
            Action::Custom("archive".to_string())
        );
    }

    #[test]
    fn test_codename() {
        let model = ModelType::new("ItemA").unwrap();
        assert_eq!(Action::View.codename(&model), "view_itema");
        assert_eq!(Action::Change.codename(&model), "change_itema");
        assert_eq!(Action::Create.codename(&model), "add_itema");
    }

    #[test]
    fn test_object_missing_field_is_null() {
        let obj = Object::new(ModelType::new("ItemA").unwrap(), ObjectId(1))
            .with_field("parent_id", ObjectId(3));
        assert_eq!(obj.field("parent_id").as_object_id(), Some(ObjectId(3)));
        assert!(obj.field("owner_id").is_null());
    }

    #[test]
    fn test_field_path_parse() {
        let path = FieldPath::parse("parent.owner").unwrap();
        assert_eq!(path.relations(), &["parent".to_string()]);
        assert_eq!(path.field(), "owner");

        let path = FieldPath::parse("parent__owner").unwrap();
        assert_eq!(path.to_string(), "parent.owner");

        assert!(FieldPath::parse("").is_err());
        assert!(FieldPath::parse("parent..owner").is_err());
    }

    #[test]
    fn test_field_path_rejects_mixed_separators() {
        assert!(FieldPath::parse("parent__owner.name").is_err());
        assert!(FieldPath::parse("parent.owner__name").is_err());
        assert!(FieldPath::parse("owner_id").is_ok());
    }

    #[test]
    fn test_field_path_deserializes_through_parse() {
        let path: FieldPath = serde_json::from_str("\"parent__owner\"").unwrap();
        assert_eq!(path.field(), "owner");
        assert_eq!(serde_json::to_string(&path).unwrap(), "\"parent.owner\"");

        assert!(serde_json::from_str::<FieldPath>("\"\"").is_err());
        assert!(serde_json::from_str::<FieldPath>("[]").is_err());
        assert!(serde_json::from_str::<FieldPath>("\"a__b.c\"").is_err());
    }
}
