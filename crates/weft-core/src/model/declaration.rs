//! Declarations of the base program and their stable keys.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::body::{BodyFragment, Expression};
use crate::error::ProgramError;

/// Stable identity of a declaration.
///
/// Member keys are formed as `<parent>::<name>`; type keys are free-form
/// (usually the qualified type name). A key survives replacement: after a
/// Replace, the original key resolves to the replacement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeclarationKey(pub String);

impl DeclarationKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Key of a member named `name` declared inside `parent`
    pub fn member(parent: &DeclarationKey, name: &str) -> Self {
        Self(format!("{}::{}", parent.0, name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeclarationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeclarationKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for DeclarationKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&DeclarationKey> for DeclarationKey {
    fn from(value: &DeclarationKey) -> Self {
        value.clone()
    }
}

/// Compilation unit (source file or generated source group) a declaration
/// is emitted into.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompilationUnitId(pub String);

impl CompilationUnitId {
    pub fn new(unit: impl Into<String>) -> Self {
        Self(unit.into())
    }
}

impl fmt::Display for CompilationUnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclarationKind {
    Type,
    Method,
    Constructor,
    Property,
    Indexer,
    Event,
    Field,
}

impl DeclarationKind {
    /// Accessors a declaration of this kind exposes
    pub fn accessors(self) -> &'static [Accessor] {
        match self {
            DeclarationKind::Method | DeclarationKind::Constructor => &[Accessor::Body],
            DeclarationKind::Property | DeclarationKind::Indexer => &[Accessor::Get, Accessor::Set],
            DeclarationKind::Event => &[Accessor::Add, Accessor::Remove],
            DeclarationKind::Type | DeclarationKind::Field => &[],
        }
    }

    pub fn is_type(self) -> bool {
        matches!(self, DeclarationKind::Type)
    }

    pub fn keyword(self) -> &'static str {
        match self {
            DeclarationKind::Type => "class",
            DeclarationKind::Method => "method",
            DeclarationKind::Constructor => "constructor",
            DeclarationKind::Property => "property",
            DeclarationKind::Indexer => "indexer",
            DeclarationKind::Event => "event",
            DeclarationKind::Field => "field",
        }
    }
}

impl fmt::Display for DeclarationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// One independently chainable piece of a member's behavior.
///
/// Methods and constructors have a single `Body`; properties and indexers
/// have `Get`/`Set`; events have `Add`/`Remove`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Accessor {
    Body,
    Get,
    Set,
    Add,
    Remove,
}

impl Accessor {
    /// Prefix used when an accessor is lifted into a standalone member name
    pub fn prefix(self) -> &'static str {
        match self {
            Accessor::Body => "",
            Accessor::Get => "get_",
            Accessor::Set => "set_",
            Accessor::Add => "add_",
            Accessor::Remove => "remove_",
        }
    }

    /// Whether the accessor receives the implicit `value` parameter
    pub fn takes_value(self) -> bool {
        matches!(self, Accessor::Set | Accessor::Add | Accessor::Remove)
    }

    /// Name of the accessor as it would appear in a chain-helper name
    pub fn member_name(self, member: &str) -> String {
        format!("{}{}", self.prefix(), member)
    }
}

impl fmt::Display for Accessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Accessor::Body => "body",
            Accessor::Get => "get",
            Accessor::Set => "set",
            Accessor::Add => "add",
            Accessor::Remove => "remove",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

impl Parameter {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// Parameters and return type of a member.
///
/// For properties and events `return_type` is the member's value type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(default)]
    pub return_type: Option<String>,
}

impl Signature {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn returns(mut self, type_name: impl Into<String>) -> Self {
        self.return_type = Some(type_name.into());
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.parameters.push(Parameter::new(name, type_name));
        self
    }

    /// Arguments forwarding every parameter of an accessor unchanged
    pub fn forwarding_arguments(&self, accessor: Accessor) -> Vec<Expression> {
        let mut arguments: Vec<Expression> = self
            .parameters
            .iter()
            .map(|p| Expression::Identifier(p.name.clone()))
            .collect();
        if accessor.takes_value() {
            arguments.push(Expression::Identifier("value".to_string()));
        }
        arguments
    }
}

/// Attribute-like marker attached to a declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub name: String,
    #[serde(default)]
    pub arguments: Vec<String>,
}

impl Annotation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: Vec::new(),
        }
    }

    pub fn with_argument(mut self, argument: impl Into<String>) -> Self {
        self.arguments.push(argument.into());
        self
    }
}

/// A declaration of the base program.
///
/// `accessors` maps each accessor to its source body; `None` marks an
/// abstract, extern or automatic accessor with no implementation to chain to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Declaration {
    pub key: DeclarationKey,
    pub name: String,
    pub kind: DeclarationKind,
    #[serde(default)]
    pub parent: Option<DeclarationKey>,
    #[serde(default)]
    pub unit: CompilationUnitId,
    #[serde(default)]
    pub signature: Signature,
    #[serde(default)]
    pub modifiers: Vec<String>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    #[serde(default)]
    pub interfaces: Vec<String>,
    #[serde(default)]
    pub accessors: IndexMap<Accessor, Option<BodyFragment>>,
    #[serde(default)]
    pub initializer: Option<Expression>,
}

impl Declaration {
    /// Create a top-level type declaration
    pub fn type_decl(key: impl Into<DeclarationKey>, unit: impl Into<String>) -> Self {
        let key = key.into();
        let name = key
            .as_str()
            .rsplit(|c| c == '.' || c == ':')
            .next()
            .unwrap_or(key.as_str())
            .to_string();
        Self {
            key,
            name,
            kind: DeclarationKind::Type,
            parent: None,
            unit: CompilationUnitId::new(unit),
            signature: Signature::default(),
            modifiers: Vec::new(),
            annotations: Vec::new(),
            interfaces: Vec::new(),
            accessors: IndexMap::new(),
            initializer: None,
        }
    }

    /// Create a member of `parent`; the key is derived from the parent key
    pub fn member(parent: &Declaration, name: impl Into<String>, kind: DeclarationKind) -> Self {
        let name = name.into();
        Self {
            key: DeclarationKey::member(&parent.key, &name),
            name,
            kind,
            parent: Some(parent.key.clone()),
            unit: parent.unit.clone(),
            signature: Signature::default(),
            modifiers: Vec::new(),
            annotations: Vec::new(),
            interfaces: Vec::new(),
            accessors: IndexMap::new(),
            initializer: None,
        }
    }

    pub fn with_signature(mut self, signature: Signature) -> Self {
        self.signature = signature;
        self
    }

    pub fn with_accessor(mut self, accessor: Accessor, body: Option<BodyFragment>) -> Self {
        self.accessors.insert(accessor, body);
        self
    }

    /// Set the body of a method or constructor
    pub fn with_body(self, body: BodyFragment) -> Self {
        self.with_accessor(Accessor::Body, Some(body))
    }

    pub fn with_modifier(mut self, modifier: impl Into<String>) -> Self {
        self.modifiers.push(modifier.into());
        self
    }

    pub fn with_annotation(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.interfaces.push(interface.into());
        self
    }

    pub fn with_initializer(mut self, initializer: Expression) -> Self {
        self.initializer = Some(initializer);
        self
    }

    pub fn has_accessor(&self, accessor: Accessor) -> bool {
        self.accessors.contains_key(&accessor)
    }

    pub fn accessor_body(&self, accessor: Accessor) -> Option<&BodyFragment> {
        self.accessors.get(&accessor).and_then(Option::as_ref)
    }
}

/// Ordered declaration table of the base program.
///
/// Sibling order is table order. Parents must be added before children.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<Declaration>", into = "Vec<Declaration>")]
pub struct SourceProgram {
    declarations: Vec<Declaration>,
    index: IndexMap<DeclarationKey, usize>,
}

impl SourceProgram {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a declaration, rejecting duplicate keys and unknown parents
    pub fn add(&mut self, declaration: Declaration) -> Result<(), ProgramError> {
        if self.index.contains_key(&declaration.key) {
            return Err(ProgramError::DuplicateDeclaration {
                key: declaration.key,
            });
        }
        if let Some(parent) = &declaration.parent {
            match self.get(parent) {
                Some(p) if p.kind.is_type() => {}
                Some(_) => {
                    return Err(ProgramError::ParentNotType {
                        key: declaration.key.clone(),
                        parent: parent.clone(),
                    })
                }
                None => {
                    return Err(ProgramError::UnknownParent {
                        key: declaration.key.clone(),
                        parent: parent.clone(),
                    })
                }
            }
        }
        self.index
            .insert(declaration.key.clone(), self.declarations.len());
        self.declarations.push(declaration);
        Ok(())
    }

    /// Builder-style [`SourceProgram::add`]
    pub fn with(mut self, declaration: Declaration) -> Result<Self, ProgramError> {
        self.add(declaration)?;
        Ok(self)
    }

    pub fn get(&self, key: &DeclarationKey) -> Option<&Declaration> {
        self.index.get(key).map(|&i| &self.declarations[i])
    }

    pub fn contains(&self, key: &DeclarationKey) -> bool {
        self.index.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Declaration> {
        self.declarations.iter()
    }

    /// Direct children of `parent`, in declaration order
    pub fn children<'a>(
        &'a self,
        parent: &DeclarationKey,
    ) -> impl Iterator<Item = &'a Declaration> + 'a {
        let parent = parent.clone();
        self.declarations
            .iter()
            .filter(move |d| d.parent.as_ref() == Some(&parent))
    }

    /// Types without a parent, in declaration order
    pub fn root_types(&self) -> impl Iterator<Item = &Declaration> {
        self.declarations
            .iter()
            .filter(|d| d.kind.is_type() && d.parent.is_none())
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }
}

impl TryFrom<Vec<Declaration>> for SourceProgram {
    type Error = ProgramError;

    fn try_from(declarations: Vec<Declaration>) -> Result<Self, Self::Error> {
        let mut program = SourceProgram::new();
        for declaration in declarations {
            program.add(declaration)?;
        }
        Ok(program)
    }
}

impl From<SourceProgram> for Vec<Declaration> {
    fn from(program: SourceProgram) -> Self {
        program.declarations
    }
}
