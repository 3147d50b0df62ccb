//! Shared fixtures for weave integration tests

#![allow(dead_code)]

use weft_core::model::{Annotation, BodyFragment, Expression, Statement};
use weft_core::{
    Accessor, BoundTemplate, Declaration, DeclarationKey, DeclarationKind, Signature, SourceProgram,
};

/// `Order` with a constructor, a field, a method, two properties and an
/// event, all in `Order.cs`
pub fn order_program() -> anyhow::Result<SourceProgram> {
    let order = Declaration::type_decl("Order", "Order.cs")
        .with_modifier("public")
        .with_annotation(Annotation::new("Serializable"));
    let ctor = Declaration::member(&order, ".ctor", DeclarationKind::Constructor)
        .with_modifier("public")
        .with_body(BodyFragment::new(vec![Statement::Comment("original".into())]));
    let items = Declaration::member(&order, "items", DeclarationKind::Field)
        .with_modifier("private")
        .with_signature(Signature::new().returns("List"))
        .with_initializer(Expression::call("NewList", vec![]));
    let total = Declaration::member(&order, "Total", DeclarationKind::Method)
        .with_modifier("public")
        .with_signature(Signature::new().returns("decimal"))
        .with_body(returns("subtotal"));
    let name = Declaration::member(&order, "Name", DeclarationKind::Property)
        .with_modifier("public")
        .with_signature(Signature::new().returns("string"))
        .with_accessor(Accessor::Get, Some(returns("name")))
        .with_accessor(Accessor::Set, Some(assigns("name")));
    let display = Declaration::member(&order, "DisplayName", DeclarationKind::Property)
        .with_modifier("public")
        .with_signature(Signature::new().returns("string"))
        .with_accessor(Accessor::Get, Some(returns("display")))
        .with_accessor(Accessor::Set, Some(assigns("display")));
    let changed = Declaration::member(&order, "Changed", DeclarationKind::Event)
        .with_modifier("public")
        .with_signature(Signature::new().returns("EventHandler"))
        .with_accessor(Accessor::Add, Some(BodyFragment::default()))
        .with_accessor(Accessor::Remove, Some(BodyFragment::default()));

    let program = SourceProgram::new()
        .with(order)?
        .with(ctor)?
        .with(items)?
        .with(total)?
        .with(name)?
        .with(display)?
        .with(changed)?;
    Ok(program)
}

pub fn key(text: &str) -> DeclarationKey {
    DeclarationKey::new(text)
}

pub fn returns(name: &str) -> BodyFragment {
    BodyFragment::new(vec![Statement::ret(Expression::ident(name))])
}

pub fn assigns(field: &str) -> BodyFragment {
    BodyFragment::new(vec![Statement::Assign {
        target: Expression::ident(field),
        value: Expression::ident("value"),
    }])
}

/// `Log(label); return proceed();`
pub fn logging(label: &str) -> BoundTemplate {
    BoundTemplate::new(
        label,
        BodyFragment::new(vec![
            Statement::expr(Expression::call("Log", vec![Expression::string(label)])),
            Statement::ret(Expression::proceed()),
        ]),
    )
}

/// A single comment statement, easy to spot in bodies
pub fn marker(text: &str) -> BoundTemplate {
    BoundTemplate::new(text, BodyFragment::new(vec![Statement::Comment(text.into())]))
}

pub fn comments(texts: &[&str]) -> Vec<Statement> {
    texts.iter().map(|t| Statement::Comment(t.to_string())).collect()
}
