//! Transformations: the atomic units of change emitted by advice.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::advice::{Advice, AspectLayerId, OrderingContext, WeaveOrder};
use super::body::{BodyFragment, Expression};
use super::declaration::{
    Accessor, Annotation, CompilationUnitId, DeclarationKey, DeclarationKind, Signature,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransformationId(pub u64);

impl fmt::Display for TransformationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// Who can see the effect of a transformation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Observability {
    /// Visible to all later advice, even ones working on a coarse view
    #[default]
    Always,
    /// Visible to the weaver only, not to later advice's semantic queries
    CompileTimeOnly,
    /// Invisible outside the weave (mechanical scaffolding)
    None,
}

/// Consumer of a weave result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Viewer {
    Advice,
    Weaver,
    Printer,
}

impl Observability {
    pub fn is_visible_to(self, viewer: Viewer) -> bool {
        match (self, viewer) {
            (_, Viewer::Printer) => true,
            (Observability::Always, _) => true,
            (Observability::CompileTimeOnly, Viewer::Weaver) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertRelation {
    Before,
    After,
    Within,
}

/// Placement of an introduced declaration relative to an existing one
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InsertPosition {
    pub relation: InsertRelation,
    pub anchor: DeclarationKey,
}

impl InsertPosition {
    pub fn before(anchor: impl Into<DeclarationKey>) -> Self {
        Self {
            relation: InsertRelation::Before,
            anchor: anchor.into(),
        }
    }

    pub fn after(anchor: impl Into<DeclarationKey>) -> Self {
        Self {
            relation: InsertRelation::After,
            anchor: anchor.into(),
        }
    }

    pub fn within(anchor: impl Into<DeclarationKey>) -> Self {
        Self {
            relation: InsertRelation::Within,
            anchor: anchor.into(),
        }
    }
}

/// Logical position of an inserted statement fragment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertedStatementKind {
    /// Runs before everything else, whatever the contributor order
    Initializer,
    CurrentEntry,
    Beginning,
}

impl InsertedStatementKind {
    pub fn rank(self) -> u8 {
        match self {
            InsertedStatementKind::Initializer => 0,
            InsertedStatementKind::CurrentEntry | InsertedStatementKind::Beginning => 1,
        }
    }
}

/// A body template together with its bound arguments.
///
/// `fail` marks a template whose expansion is known to fail; the reference
/// expander reports it verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundTemplate {
    pub name: String,
    #[serde(default)]
    pub arguments: IndexMap<String, Expression>,
    #[serde(default)]
    pub body: BodyFragment,
    #[serde(default)]
    pub fail: Option<String>,
}

impl BoundTemplate {
    pub fn new(name: impl Into<String>, body: BodyFragment) -> Self {
        Self {
            name: name.into(),
            arguments: IndexMap::new(),
            body,
            fail: None,
        }
    }

    pub fn with_argument(mut self, name: impl Into<String>, value: Expression) -> Self {
        self.arguments.insert(name.into(), value);
        self
    }

    pub fn failing(mut self, reason: impl Into<String>) -> Self {
        self.fail = Some(reason.into());
        self
    }
}

/// Shape of a declaration introduced (or installed as a replacement)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberSpec {
    pub name: String,
    pub kind: DeclarationKind,
    #[serde(default)]
    pub signature: Signature,
    #[serde(default)]
    pub modifiers: Vec<String>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    /// Accessor bodies; an accessor mapped to `None` exists without body
    #[serde(default)]
    pub templates: IndexMap<Accessor, Option<BoundTemplate>>,
    #[serde(default)]
    pub initializer: Option<BoundTemplate>,
    #[serde(default)]
    pub position: Option<InsertPosition>,
}

impl MemberSpec {
    pub fn new(name: impl Into<String>, kind: DeclarationKind) -> Self {
        Self {
            name: name.into(),
            kind,
            signature: Signature::default(),
            modifiers: Vec::new(),
            annotations: Vec::new(),
            templates: IndexMap::new(),
            initializer: None,
            position: None,
        }
    }

    pub fn with_signature(mut self, signature: Signature) -> Self {
        self.signature = signature;
        self
    }

    pub fn with_modifier(mut self, modifier: impl Into<String>) -> Self {
        self.modifiers.push(modifier.into());
        self
    }

    pub fn with_annotation(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn with_template(mut self, accessor: Accessor, template: BoundTemplate) -> Self {
        self.templates.insert(accessor, Some(template));
        self
    }

    /// Declare an accessor without a body (abstract or automatic)
    pub fn with_bodiless(mut self, accessor: Accessor) -> Self {
        self.templates.insert(accessor, None);
        self
    }

    pub fn with_initializer(mut self, template: BoundTemplate) -> Self {
        self.initializer = Some(template);
        self
    }

    pub fn at(mut self, position: InsertPosition) -> Self {
        self.position = Some(position);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransformationKind {
    /// Add a new member to the target type
    Introduce { member: MemberSpec },
    /// Wrap accessors of the target, chaining to the previous behavior
    Override {
        templates: IndexMap<Accessor, BoundTemplate>,
    },
    /// Substitute the target's identity with a new member
    Replace { replacement: MemberSpec },
    /// Forward accessors of the target to another declaration; an empty
    /// accessor list covers every accessor of the target
    Redirect {
        to: DeclarationKey,
        #[serde(default)]
        accessors: Vec<Accessor>,
    },
    /// Splice statements at the entry of a method or constructor
    InsertStatement {
        position: InsertedStatementKind,
        template: BoundTemplate,
    },
    AddAnnotation { annotation: Annotation },
    RemoveAnnotation { name: String },
    /// Make the target type implement an interface; `members` maps each
    /// interface member name to the implementing declaration
    ImplementInterface {
        interface: String,
        #[serde(default)]
        members: IndexMap<String, DeclarationKey>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformationTag {
    Introduce,
    Override,
    Replace,
    Redirect,
    InsertStatement,
    AddAnnotation,
    RemoveAnnotation,
    ImplementInterface,
}

impl fmt::Display for TransformationTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransformationTag::Introduce => "Introduce",
            TransformationTag::Override => "Override",
            TransformationTag::Replace => "Replace",
            TransformationTag::Redirect => "Redirect",
            TransformationTag::InsertStatement => "InsertStatement",
            TransformationTag::AddAnnotation => "AddAnnotation",
            TransformationTag::RemoveAnnotation => "RemoveAnnotation",
            TransformationTag::ImplementInterface => "ImplementInterface",
        };
        f.write_str(name)
    }
}

/// The atomic unit of change.
///
/// Immutable once built: the `with_*` methods return modified copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transformation {
    id: TransformationId,
    advice: Advice,
    order: WeaveOrder,
    target: DeclarationKey,
    #[serde(default)]
    container: Option<CompilationUnitId>,
    #[serde(default)]
    observability: Observability,
    #[serde(default)]
    dependencies: Vec<TransformationId>,
    #[serde(flatten)]
    kind: TransformationKind,
}

impl Transformation {
    fn new(
        ctx: &mut OrderingContext,
        advice: &Advice,
        target: DeclarationKey,
        kind: TransformationKind,
    ) -> Self {
        Self {
            id: ctx.next_id(),
            advice: advice.clone(),
            order: ctx.next_order(),
            target,
            container: None,
            observability: Observability::Always,
            dependencies: Vec::new(),
            kind,
        }
    }

    /// Build a transformation from explicit parts, bypassing an
    /// [`OrderingContext`]
    pub fn from_parts(
        id: TransformationId,
        advice: Advice,
        order: WeaveOrder,
        target: DeclarationKey,
        kind: TransformationKind,
    ) -> Self {
        Self {
            id,
            advice,
            order,
            target,
            container: None,
            observability: Observability::Always,
            dependencies: Vec::new(),
            kind,
        }
    }

    pub fn introduce(
        ctx: &mut OrderingContext,
        advice: &Advice,
        parent: impl Into<DeclarationKey>,
        member: MemberSpec,
    ) -> Self {
        Self::new(ctx, advice, parent.into(), TransformationKind::Introduce { member })
    }

    pub fn override_accessors(
        ctx: &mut OrderingContext,
        advice: &Advice,
        target: impl Into<DeclarationKey>,
        templates: impl IntoIterator<Item = (Accessor, BoundTemplate)>,
    ) -> Self {
        let templates = templates.into_iter().collect();
        Self::new(ctx, advice, target.into(), TransformationKind::Override { templates })
    }

    /// Override the body of a method or constructor
    pub fn override_body(
        ctx: &mut OrderingContext,
        advice: &Advice,
        target: impl Into<DeclarationKey>,
        template: BoundTemplate,
    ) -> Self {
        Self::override_accessors(ctx, advice, target, [(Accessor::Body, template)])
    }

    pub fn replace(
        ctx: &mut OrderingContext,
        advice: &Advice,
        replaced: impl Into<DeclarationKey>,
        replacement: MemberSpec,
    ) -> Self {
        Self::new(ctx, advice, replaced.into(), TransformationKind::Replace { replacement })
    }

    pub fn redirect(
        ctx: &mut OrderingContext,
        advice: &Advice,
        target: impl Into<DeclarationKey>,
        to: impl Into<DeclarationKey>,
    ) -> Self {
        Self::redirect_accessors(ctx, advice, target, to, Vec::new())
    }

    pub fn redirect_accessors(
        ctx: &mut OrderingContext,
        advice: &Advice,
        target: impl Into<DeclarationKey>,
        to: impl Into<DeclarationKey>,
        accessors: Vec<Accessor>,
    ) -> Self {
        let kind = TransformationKind::Redirect {
            to: to.into(),
            accessors,
        };
        Self::new(ctx, advice, target.into(), kind)
    }

    pub fn insert_statement(
        ctx: &mut OrderingContext,
        advice: &Advice,
        target: impl Into<DeclarationKey>,
        position: InsertedStatementKind,
        template: BoundTemplate,
    ) -> Self {
        let kind = TransformationKind::InsertStatement { position, template };
        Self::new(ctx, advice, target.into(), kind)
    }

    pub fn add_annotation(
        ctx: &mut OrderingContext,
        advice: &Advice,
        target: impl Into<DeclarationKey>,
        annotation: Annotation,
    ) -> Self {
        Self::new(ctx, advice, target.into(), TransformationKind::AddAnnotation { annotation })
    }

    pub fn remove_annotation(
        ctx: &mut OrderingContext,
        advice: &Advice,
        target: impl Into<DeclarationKey>,
        name: impl Into<String>,
    ) -> Self {
        let kind = TransformationKind::RemoveAnnotation { name: name.into() };
        Self::new(ctx, advice, target.into(), kind)
    }

    pub fn implement_interface(
        ctx: &mut OrderingContext,
        advice: &Advice,
        target_type: impl Into<DeclarationKey>,
        interface: impl Into<String>,
        members: impl IntoIterator<Item = (String, DeclarationKey)>,
    ) -> Self {
        let kind = TransformationKind::ImplementInterface {
            interface: interface.into(),
            members: members.into_iter().collect(),
        };
        Self::new(ctx, advice, target_type.into(), kind)
    }

    pub fn with_observability(mut self, observability: Observability) -> Self {
        self.observability = observability;
        self
    }

    pub fn with_container(mut self, container: CompilationUnitId) -> Self {
        self.container = Some(container);
        self
    }

    pub fn with_dependency(mut self, dependency: TransformationId) -> Self {
        if !self.dependencies.contains(&dependency) {
            self.dependencies.push(dependency);
        }
        self
    }

    /// Copy with a different body template.
    ///
    /// Applies to overrides (for `accessor`) and statement insertions; other
    /// kinds are returned unchanged.
    pub fn with_template(mut self, accessor: Accessor, template: BoundTemplate) -> Self {
        match &mut self.kind {
            TransformationKind::Override { templates } => {
                templates.insert(accessor, template);
            }
            TransformationKind::InsertStatement { template: t, .. } => *t = template,
            _ => {}
        }
        self
    }

    pub fn id(&self) -> TransformationId {
        self.id
    }

    pub fn advice(&self) -> &Advice {
        &self.advice
    }

    pub fn layer(&self) -> &AspectLayerId {
        &self.advice.layer
    }

    pub fn order(&self) -> WeaveOrder {
        self.order
    }

    /// Direct target, or the containing type for introductions
    pub fn target(&self) -> &DeclarationKey {
        &self.target
    }

    pub fn container(&self) -> Option<&CompilationUnitId> {
        self.container.as_ref()
    }

    pub fn observability(&self) -> Observability {
        self.observability
    }

    pub fn dependencies(&self) -> &[TransformationId] {
        &self.dependencies
    }

    pub fn kind(&self) -> &TransformationKind {
        &self.kind
    }

    pub fn tag(&self) -> TransformationTag {
        match &self.kind {
            TransformationKind::Introduce { .. } => TransformationTag::Introduce,
            TransformationKind::Override { .. } => TransformationTag::Override,
            TransformationKind::Replace { .. } => TransformationTag::Replace,
            TransformationKind::Redirect { .. } => TransformationTag::Redirect,
            TransformationKind::InsertStatement { .. } => TransformationTag::InsertStatement,
            TransformationKind::AddAnnotation { .. } => TransformationTag::AddAnnotation,
            TransformationKind::RemoveAnnotation { .. } => TransformationTag::RemoveAnnotation,
            TransformationKind::ImplementInterface { .. } => TransformationTag::ImplementInterface,
        }
    }

    /// Whether initialization must run in dependency order
    pub fn is_hierarchical(&self) -> bool {
        matches!(
            self.kind,
            TransformationKind::Introduce { .. }
                | TransformationKind::Replace { .. }
                | TransformationKind::ImplementInterface { .. }
        ) || !self.dependencies.is_empty()
    }

    /// Member shape installed by an introduction or replacement
    pub fn member_spec(&self) -> Option<&MemberSpec> {
        match &self.kind {
            TransformationKind::Introduce { member } => Some(member),
            TransformationKind::Replace { replacement } => Some(replacement),
            _ => None,
        }
    }

    /// Label used in diagnostics
    pub fn to_display_string(&self) -> String {
        let subject = match &self.kind {
            TransformationKind::Introduce { member } => {
                format!("Introduce '{}' into '{}'", member.name, self.target)
            }
            TransformationKind::Replace { replacement } => {
                format!("Replace '{}' with '{}'", self.target, replacement.name)
            }
            TransformationKind::Redirect { to, .. } => {
                format!("Redirect of '{}' to '{}'", self.target, to)
            }
            TransformationKind::InsertStatement { position, .. } => {
                format!("InsertStatement ({:?}) into '{}'", position, self.target)
            }
            TransformationKind::AddAnnotation { annotation } => {
                format!("AddAnnotation '{}' on '{}'", annotation.name, self.target)
            }
            TransformationKind::RemoveAnnotation { name } => {
                format!("RemoveAnnotation '{}' from '{}'", name, self.target)
            }
            TransformationKind::ImplementInterface { interface, .. } => {
                format!("ImplementInterface '{}' on '{}'", interface, self.target)
            }
            TransformationKind::Override { .. } => format!("Override of '{}'", self.target),
        };
        format!("{} by '{}' [{}]", subject, self.advice.name, self.advice.layer)
    }
}

impl fmt::Display for Transformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::body::Statement;

    fn template(name: &str) -> BoundTemplate {
        BoundTemplate::new(name, BodyFragment::new(vec![Statement::ret(Expression::proceed())]))
    }

    #[test]
    fn test_constructors_allocate_increasing_orders() {
        let mut ctx = OrderingContext::new();
        let advice = Advice::new("Log", "Logging");
        let first =
            Transformation::override_body(&mut ctx, &advice, "Order::Total", template("a"));
        let second =
            Transformation::override_body(&mut ctx, &advice, "Order::Total", template("b"));

        assert_ne!(first.id(), second.id());
        assert!(first.order() < second.order());
        assert_eq!(first.tag(), TransformationTag::Override);
        assert!(!first.is_hierarchical());
    }

    #[test]
    fn test_with_template_copies_instead_of_mutating() {
        let mut ctx = OrderingContext::new();
        let advice = Advice::new("Log", "Logging");
        let original =
            Transformation::override_body(&mut ctx, &advice, "Order::Total", template("a"));
        let changed = original.clone().with_template(Accessor::Body, template("b"));

        let name_of = |t: &Transformation| match t.kind() {
            TransformationKind::Override { templates } => templates[&Accessor::Body].name.clone(),
            _ => unreachable!(),
        };
        assert_eq!(name_of(&original), "a");
        assert_eq!(name_of(&changed), "b");
        assert_eq!(original.id(), changed.id());
    }

    #[test]
    fn test_display_string_names_advice_and_layer() {
        let mut ctx = OrderingContext::new();
        let advice = Advice::new("NotifyAttribute", "Notify");
        let introduce = Transformation::introduce(
            &mut ctx,
            &advice,
            "Order",
            MemberSpec::new("OnChanged", DeclarationKind::Method),
        );
        assert_eq!(
            introduce.to_display_string(),
            "Introduce 'OnChanged' into 'Order' by 'NotifyAttribute' [Notify]"
        );
        assert!(introduce.is_hierarchical());
    }

    #[test]
    fn test_dependencies_make_any_kind_hierarchical() {
        let mut ctx = OrderingContext::new();
        let advice = Advice::new("Log", "Logging");
        let t =
            Transformation::add_annotation(&mut ctx, &advice, "Order", Annotation::new("Logged"))
            .with_dependency(TransformationId(7))
            .with_dependency(TransformationId(7));
        assert!(t.is_hierarchical());
        assert_eq!(t.dependencies(), &[TransformationId(7)]);
    }

    #[test]
    fn test_observability_views() {
        assert!(Observability::Always.is_visible_to(Viewer::Advice));
        assert!(!Observability::CompileTimeOnly.is_visible_to(Viewer::Advice));
        assert!(Observability::CompileTimeOnly.is_visible_to(Viewer::Weaver));
        assert!(!Observability::None.is_visible_to(Viewer::Weaver));
        assert!(Observability::None.is_visible_to(Viewer::Printer));
    }

    #[test]
    fn test_transformation_json_roundtrip() {
        let mut ctx = OrderingContext::new();
        let advice = Advice::new("Log", "Logging");
        let t = Transformation::insert_statement(
            &mut ctx,
            &advice,
            "Order::.ctor",
            InsertedStatementKind::Initializer,
            template("init"),
        )
        .with_observability(Observability::CompileTimeOnly);

        let json = serde_json::to_string(&t).unwrap();
        let restored: Transformation = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, t);
    }
}
