//! Payload shapes – the declarative contract each template package ships in
//! its shape file.
//!
//! A shape file is JSON:
//!
//! ```json
//! {
//!   "closed": false,
//!   "fields": [
//!     { "name": "client_name", "type": "string", "required": true, "min_length": 1 },
//!     { "name": "max_attendees", "type": ["string", "integer", "number"] },
//!     { "name": "items", "type": "array", "items": { "type": "object", "fields": [] } }
//!   ]
//! }
//! ```
//!
//! It is parsed once into a [`PayloadShape`], a tree of tagged field types
//! interpreted by the generic validator in [`crate::validate`]. The same tree
//! answers "what does this template need" through [`PayloadShape::to_json`]
//! and [`PayloadShape::example_payload`], so whatever `describe` advertises is
//! exactly what `validate` accepts.

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Map, Value as JsonValue};

use crate::error::{Error, Result};
use crate::payload::Value;
use crate::validate;

// ---------------------------------------------------------------------------
// Shape types
// ---------------------------------------------------------------------------

/// Scalar types a field may accept.
///
/// The declaration order is the coercion precedence: when a value fits
/// several members of a union, the earliest one wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Primitive {
    Boolean,
    Integer,
    Number,
    String,
}

impl Primitive {
    pub fn name(self) -> &'static str {
        match self {
            Primitive::Boolean => "boolean",
            Primitive::Integer => "integer",
            Primitive::Number => "number",
            Primitive::String => "string",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "boolean" => Some(Primitive::Boolean),
            "integer" => Some(Primitive::Integer),
            "number" => Some(Primitive::Number),
            "string" => Some(Primitive::String),
            _ => None,
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The structural type of a field or array item.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    /// Two or more scalar types, kept sorted by coercion precedence.
    Union(Vec<Primitive>),
    Object(ObjectShape),
    Array(Box<TypeSpec>),
}

impl FieldType {
    /// Scalar types this field accepts; empty for objects and arrays.
    pub fn primitives(&self) -> &[Primitive] {
        match self {
            FieldType::String => &[Primitive::String],
            FieldType::Integer => &[Primitive::Integer],
            FieldType::Number => &[Primitive::Number],
            FieldType::Boolean => &[Primitive::Boolean],
            FieldType::Union(members) => members,
            FieldType::Object(_) | FieldType::Array(_) => &[],
        }
    }

    fn accepts(&self, primitive: Primitive) -> bool {
        self.primitives().contains(&primitive)
    }

    fn type_json(&self) -> JsonValue {
        match self {
            FieldType::Union(members) => {
                JsonValue::Array(members.iter().map(|p| json!(p.name())).collect())
            }
            FieldType::Object(_) => json!("object"),
            FieldType::Array(_) => json!("array"),
            scalar => json!(scalar.primitives()[0].name()),
        }
    }
}

/// Value-level rules checked after coercion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Constraints {
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub choices: Option<Vec<String>>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub exclusive_minimum: Option<f64>,
    pub exclusive_maximum: Option<f64>,
    pub min_items: Option<usize>,
    pub max_items: Option<usize>,
}

/// A type together with its constraints and null policy.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeSpec {
    pub ty: FieldType,
    pub constraints: Constraints,
    /// Whether an explicit `null` is accepted (and kept as `null`).
    pub nullable: bool,
}

/// A named member of an object shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub required: bool,
    /// Advertised value for callers; never injected into payloads.
    pub default: Option<Value>,
    pub description: Option<String>,
    pub spec: TypeSpec,
}

/// An object: ordered fields plus the policy for undeclared keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectShape {
    /// Closed objects reject undeclared keys; open ones drop them.
    pub closed: bool,
    pub fields: Vec<Field>,
}

impl ObjectShape {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// The parsed shape of one template's payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PayloadShape {
    root: ObjectShape,
}

impl PayloadShape {
    pub fn new(root: ObjectShape) -> Self {
        Self { root }
    }

    /// Read and parse a shape file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::InvalidShapeDefinition {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::parse(&text).map_err(|reason| Error::InvalidShapeDefinition {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Parse shape JSON; the error is a human readable reason.
    pub fn parse(text: &str) -> std::result::Result<Self, String> {
        let raw: RawShape = serde_json::from_str(text).map_err(|e| e.to_string())?;
        let root = convert_object(raw.closed, &raw.fields, "fields")?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &ObjectShape {
        &self.root
    }

    pub fn fields(&self) -> &[Field] {
        &self.root.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.root.field(name)
    }

    /// Names of the top-level required fields, in declaration order.
    pub fn required_fields(&self) -> Vec<String> {
        self.root
            .fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.clone())
            .collect()
    }

    /// Structural description in the same format as the shape file.
    pub fn to_json(&self) -> JsonValue {
        object_json(&self.root)
    }

    /// A payload filling every declared field with a placeholder that
    /// satisfies its type and constraints.
    pub fn example_payload(&self) -> JsonValue {
        example_object(&self.root)
    }
}

impl Serialize for PayloadShape {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

// ---------------------------------------------------------------------------
// Shape file parsing
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawShape {
    #[serde(default)]
    closed: bool,
    fields: Vec<RawNode>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawKind {
    One(String),
    Many(Vec<String>),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawNode {
    name: Option<String>,
    #[serde(rename = "type")]
    kind: RawKind,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    nullable: bool,
    default: Option<JsonValue>,
    description: Option<String>,
    fields: Option<Vec<RawNode>>,
    closed: Option<bool>,
    items: Option<Box<RawNode>>,
    min_length: Option<usize>,
    max_length: Option<usize>,
    choices: Option<Vec<String>>,
    minimum: Option<f64>,
    maximum: Option<f64>,
    exclusive_minimum: Option<f64>,
    exclusive_maximum: Option<f64>,
    min_items: Option<usize>,
    max_items: Option<usize>,
}

fn convert_object(
    closed: bool,
    nodes: &[RawNode],
    at: &str,
) -> std::result::Result<ObjectShape, String> {
    let mut seen = BTreeSet::new();
    let mut fields = Vec::with_capacity(nodes.len());
    for (i, node) in nodes.iter().enumerate() {
        let here = format!("{at}[{i}]");
        let name = match node.name.as_deref().map(str::trim) {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => return Err(format!("{here}: field needs a non-empty name")),
        };
        if !seen.insert(name.clone()) {
            return Err(format!("{here}: duplicate field '{name}'"));
        }
        let spec = convert_spec(node, &here)?;
        let default = match &node.default {
            Some(raw) => {
                let mut errors = Vec::new();
                match validate::check_value(&spec, raw, &name, &mut errors) {
                    Some(v) if errors.is_empty() => Some(v),
                    _ => {
                        let reasons: Vec<String> = errors.iter().map(|e| e.reason.clone()).collect();
                        return Err(format!(
                            "{here}: default does not satisfy field '{name}': {}",
                            reasons.join(", ")
                        ));
                    }
                }
            }
            None => None,
        };
        fields.push(Field {
            name,
            required: node.required,
            default,
            description: node.description.clone(),
            spec,
        });
    }
    Ok(ObjectShape { closed, fields })
}

fn convert_spec(node: &RawNode, at: &str) -> std::result::Result<TypeSpec, String> {
    let ty = match &node.kind {
        RawKind::One(name) => match name.as_str() {
            "string" => FieldType::String,
            "integer" => FieldType::Integer,
            "number" => FieldType::Number,
            "boolean" => FieldType::Boolean,
            "object" => {
                let Some(fields) = &node.fields else {
                    return Err(format!("{at}: object type needs 'fields'"));
                };
                let closed = node.closed.unwrap_or(false);
                FieldType::Object(convert_object(closed, fields, &format!("{at}.fields"))?)
            }
            "array" => {
                let Some(items) = &node.items else {
                    return Err(format!("{at}: array type needs 'items'"));
                };
                let here = format!("{at}.items");
                if items.name.is_some() || items.required || items.default.is_some() {
                    return Err(format!(
                        "{here}: array items cannot declare name, required or default"
                    ));
                }
                FieldType::Array(Box::new(convert_spec(items, &here)?))
            }
            other => return Err(format!("{at}: unknown type '{other}'")),
        },
        RawKind::Many(names) => {
            let mut members = Vec::with_capacity(names.len());
            for name in names {
                match Primitive::from_name(name) {
                    Some(p) => members.push(p),
                    None => {
                        return Err(format!(
                            "{at}: union members must be scalar types, got '{name}'"
                        ))
                    }
                }
            }
            members.sort();
            members.dedup();
            match members.as_slice() {
                [] => return Err(format!("{at}: union type needs at least one member")),
                [Primitive::String] => FieldType::String,
                [Primitive::Integer] => FieldType::Integer,
                [Primitive::Number] => FieldType::Number,
                [Primitive::Boolean] => FieldType::Boolean,
                _ => FieldType::Union(members),
            }
        }
    };

    if node.fields.is_some() && !matches!(ty, FieldType::Object(_)) {
        return Err(format!("{at}: 'fields' only applies to object types"));
    }
    if node.closed.is_some() && !matches!(ty, FieldType::Object(_)) {
        return Err(format!("{at}: 'closed' only applies to object types"));
    }
    if node.items.is_some() && !matches!(ty, FieldType::Array(_)) {
        return Err(format!("{at}: 'items' only applies to array types"));
    }

    let constraints = Constraints {
        min_length: node.min_length,
        max_length: node.max_length,
        choices: node.choices.clone(),
        minimum: node.minimum,
        maximum: node.maximum,
        exclusive_minimum: node.exclusive_minimum,
        exclusive_maximum: node.exclusive_maximum,
        min_items: node.min_items,
        max_items: node.max_items,
    };
    check_constraints(&ty, &constraints, at)?;

    Ok(TypeSpec {
        ty,
        constraints,
        nullable: node.nullable,
    })
}

fn check_constraints(ty: &FieldType, c: &Constraints, at: &str) -> std::result::Result<(), String> {
    let textual = ty.accepts(Primitive::String);
    let numeric = ty.accepts(Primitive::Integer) || ty.accepts(Primitive::Number);
    let list = matches!(ty, FieldType::Array(_));

    let misapplied = [
        ("min_length", c.min_length.is_some() && !textual),
        ("max_length", c.max_length.is_some() && !textual),
        ("choices", c.choices.is_some() && !textual),
        ("minimum", c.minimum.is_some() && !numeric),
        ("maximum", c.maximum.is_some() && !numeric),
        ("exclusive_minimum", c.exclusive_minimum.is_some() && !numeric),
        ("exclusive_maximum", c.exclusive_maximum.is_some() && !numeric),
        ("min_items", c.min_items.is_some() && !list),
        ("max_items", c.max_items.is_some() && !list),
    ];
    if let Some((key, _)) = misapplied.iter().find(|(_, bad)| *bad) {
        return Err(format!("{at}: '{key}' does not apply to this type"));
    }

    if let (Some(lo), Some(hi)) = (c.min_length, c.max_length) {
        if lo > hi {
            return Err(format!("{at}: min_length exceeds max_length"));
        }
    }
    if let (Some(lo), Some(hi)) = (c.min_items, c.max_items) {
        if lo > hi {
            return Err(format!("{at}: min_items exceeds max_items"));
        }
    }
    if let (Some(lo), Some(hi)) = (c.minimum, c.maximum) {
        if lo > hi {
            return Err(format!("{at}: minimum exceeds maximum"));
        }
    }
    if let Some(choices) = &c.choices {
        if choices.is_empty() {
            return Err(format!("{at}: 'choices' cannot be empty"));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Description and example payloads
// ---------------------------------------------------------------------------

fn object_json(shape: &ObjectShape) -> JsonValue {
    json!({
        "closed": shape.closed,
        "fields": shape.fields.iter().map(field_json).collect::<Vec<_>>(),
    })
}

fn field_json(field: &Field) -> JsonValue {
    let mut out = Map::new();
    out.insert("name".to_string(), json!(field.name));
    out.insert("required".to_string(), json!(field.required));
    if let Some(description) = &field.description {
        out.insert("description".to_string(), json!(description));
    }
    if let Some(default) = &field.default {
        out.insert(
            "default".to_string(),
            serde_json::to_value(default).unwrap_or(JsonValue::Null),
        );
    }
    spec_json_into(&field.spec, &mut out);
    JsonValue::Object(out)
}

fn spec_json_into(spec: &TypeSpec, out: &mut Map<String, JsonValue>) {
    out.insert("type".to_string(), spec.ty.type_json());
    if spec.nullable {
        out.insert("nullable".to_string(), json!(true));
    }
    match &spec.ty {
        FieldType::Object(obj) => {
            out.insert("closed".to_string(), json!(obj.closed));
            out.insert(
                "fields".to_string(),
                JsonValue::Array(obj.fields.iter().map(field_json).collect()),
            );
        }
        FieldType::Array(items) => {
            let mut item = Map::new();
            spec_json_into(items, &mut item);
            out.insert("items".to_string(), JsonValue::Object(item));
        }
        _ => {}
    }

    let c = &spec.constraints;
    let mut put = |key: &str, value: Option<JsonValue>| {
        if let Some(v) = value {
            out.insert(key.to_string(), v);
        }
    };
    put("min_length", c.min_length.map(|v| json!(v)));
    put("max_length", c.max_length.map(|v| json!(v)));
    put("choices", c.choices.as_ref().map(|v| json!(v)));
    put("minimum", c.minimum.map(|v| json!(v)));
    put("maximum", c.maximum.map(|v| json!(v)));
    put("exclusive_minimum", c.exclusive_minimum.map(|v| json!(v)));
    put("exclusive_maximum", c.exclusive_maximum.map(|v| json!(v)));
    put("min_items", c.min_items.map(|v| json!(v)));
    put("max_items", c.max_items.map(|v| json!(v)));
}

fn example_object(shape: &ObjectShape) -> JsonValue {
    let mut out = Map::new();
    for field in &shape.fields {
        let value = match &field.default {
            Some(default) => serde_json::to_value(default).unwrap_or(JsonValue::Null),
            None => example_value(&field.spec),
        };
        out.insert(field.name.clone(), value);
    }
    JsonValue::Object(out)
}

fn example_value(spec: &TypeSpec) -> JsonValue {
    let c = &spec.constraints;
    match &spec.ty {
        FieldType::Object(obj) => example_object(obj),
        FieldType::Array(items) => {
            let wanted = c.min_items.unwrap_or(1).max(1);
            let count = c.max_items.map_or(wanted, |max| wanted.min(max));
            JsonValue::Array((0..count).map(|_| example_value(items)).collect())
        }
        scalar => match scalar.primitives()[0] {
            Primitive::Boolean => json!(false),
            Primitive::Integer => json!(example_integer(c)),
            Primitive::Number => json!(example_number(c)),
            Primitive::String => json!(example_string(c)),
        },
    }
}

/// Tightest lower bound and whether it is exclusive.
fn lower_bound(c: &Constraints) -> Option<(f64, bool)> {
    match (c.minimum, c.exclusive_minimum) {
        (Some(min), Some(ex)) if ex >= min => Some((ex, true)),
        (Some(min), _) => Some((min, false)),
        (None, Some(ex)) => Some((ex, true)),
        (None, None) => None,
    }
}

/// Tightest upper bound and whether it is exclusive.
fn upper_bound(c: &Constraints) -> Option<(f64, bool)> {
    match (c.maximum, c.exclusive_maximum) {
        (Some(max), Some(ex)) if ex <= max => Some((ex, true)),
        (Some(max), _) => Some((max, false)),
        (None, Some(ex)) => Some((ex, true)),
        (None, None) => None,
    }
}

fn in_range(c: &Constraints, value: f64) -> bool {
    c.minimum.map_or(true, |min| value >= min)
        && c.maximum.map_or(true, |max| value <= max)
        && c.exclusive_minimum.map_or(true, |ex| value > ex)
        && c.exclusive_maximum.map_or(true, |ex| value < ex)
}

/// Integer closest to zero inside the bounds.
fn example_integer(c: &Constraints) -> i64 {
    let lo = lower_bound(c).map(|(v, exclusive)| if exclusive { v.floor() + 1.0 } else { v.ceil() });
    let hi = upper_bound(c).map(|(v, exclusive)| if exclusive { v.ceil() - 1.0 } else { v.floor() });
    let mut value = 0.0f64;
    if let Some(lo) = lo {
        value = value.max(lo);
    }
    if let Some(hi) = hi {
        value = value.min(hi);
    }
    value as i64
}

/// Zero when allowed, otherwise a bound, the midpoint of both bounds, or a
/// step inside one of them.
fn example_number(c: &Constraints) -> f64 {
    let lo = lower_bound(c);
    let hi = upper_bound(c);
    let mut candidates = vec![0.0];
    candidates.extend(lo.filter(|&(_, exclusive)| !exclusive).map(|(v, _)| v));
    candidates.extend(hi.filter(|&(_, exclusive)| !exclusive).map(|(v, _)| v));
    if let (Some((lo, _)), Some((hi, _))) = (lo, hi) {
        candidates.push((lo + hi) / 2.0);
    }
    candidates.extend(lo.map(|(v, _)| v + 1.0));
    candidates.extend(hi.map(|(v, _)| v - 1.0));
    candidates
        .into_iter()
        .find(|&v| in_range(c, v))
        .unwrap_or(0.0)
}

fn example_string(c: &Constraints) -> String {
    let fits = |text: &str| {
        let len = text.chars().count();
        c.min_length.map_or(true, |min| len >= min) && c.max_length.map_or(true, |max| len <= max)
    };
    if let Some(choices) = &c.choices {
        if let Some(choice) = choices.iter().find(|choice| fits(choice)).or(choices.first()) {
            return choice.clone();
        }
    }
    let mut text: String = match c.max_length {
        Some(max) => "string".chars().take(max).collect(),
        None => "string".to_string(),
    };
    if let Some(min) = c.min_length {
        while text.chars().count() < min {
            text.push('x');
        }
    }
    text
}
