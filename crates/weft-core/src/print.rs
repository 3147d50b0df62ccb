//! Reference print boundary.
//!
//! Renders a woven declaration set as a C#-like listing. This is the only
//! place where chain element references become names: a `ChainCall` prints
//! as a call to the name the weave assigned to the referenced element.

use indexmap::IndexMap;

use crate::materialize::{OutputDeclaration, WeaveOutput};
use crate::model::{
    Accessor, Annotation, ChainElementId, DeclarationKey, DeclarationKind, Expression, Literal,
    Statement,
};

const INDENT: &str = "    ";

/// Names visible at the print boundary
pub struct PrintContext<'a> {
    chain_names: &'a IndexMap<ChainElementId, String>,
}

impl<'a> PrintContext<'a> {
    pub fn new(chain_names: &'a IndexMap<ChainElementId, String>) -> Self {
        Self { chain_names }
    }

    fn element_name(&self, element: ChainElementId) -> String {
        self.chain_names
            .get(&element)
            .cloned()
            .unwrap_or_else(|| format!("__chain{}", element.0))
    }
}

/// Types that can render their source representation
pub trait ToSource {
    fn to_source(&self, ctx: &PrintContext<'_>) -> String;
}

impl ToSource for Literal {
    fn to_source(&self, _ctx: &PrintContext<'_>) -> String {
        match self {
            Literal::Null => "null".to_string(),
            Literal::Bool(b) => b.to_string(),
            Literal::Integer(i) => i.to_string(),
            Literal::String(s) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
        }
    }
}

fn arguments(args: &[Expression], ctx: &PrintContext<'_>) -> String {
    args.iter()
        .map(|a| a.to_source(ctx))
        .collect::<Vec<_>>()
        .join(", ")
}

fn member_name(key: &DeclarationKey) -> &str {
    key.as_str().rsplit("::").next().unwrap_or(key.as_str())
}

impl ToSource for Expression {
    fn to_source(&self, ctx: &PrintContext<'_>) -> String {
        match self {
            Expression::Literal(literal) => literal.to_source(ctx),
            Expression::Identifier(name) => name.clone(),
            Expression::This => "this".to_string(),
            Expression::Parameter(name) => format!("${name}"),
            Expression::Member { object, name } => format!("{}.{name}", object.to_source(ctx)),
            Expression::Call { callee, arguments: args } => {
                format!("{}({})", callee.to_source(ctx), arguments(args, ctx))
            }
            Expression::Binary { op, left, right } => {
                let side = |e: &Expression| match e {
                    Expression::Binary { .. } => format!("({})", e.to_source(ctx)),
                    _ => e.to_source(ctx),
                };
                format!("{} {op} {}", side(left), side(right))
            }
            Expression::Proceed { arguments: None } => "proceed()".to_string(),
            Expression::Proceed {
                arguments: Some(args),
            } => format!("proceed({})", arguments(args, ctx)),
            Expression::ChainCall {
                element,
                arguments: args,
                ..
            } => format!("this.{}({})", ctx.element_name(*element), arguments(args, ctx)),
            Expression::Forward {
                target,
                accessor,
                arguments: args,
            } => forward(member_name(target), *accessor, args, ctx),
        }
    }
}

/// Invocation of `accessor` on another member of `this`
fn forward(
    member: &str,
    accessor: Accessor,
    args: &[Expression],
    ctx: &PrintContext<'_>,
) -> String {
    let access = |index: &[Expression]| {
        if index.is_empty() {
            format!("this.{member}")
        } else {
            format!("this.{member}[{}]", arguments(index, ctx))
        }
    };
    match (accessor, args.split_last()) {
        (Accessor::Body, _) => format!("this.{member}({})", arguments(args, ctx)),
        (Accessor::Get, _) => access(args),
        (Accessor::Set, Some((value, index))) => {
            format!("{} = {}", access(index), value.to_source(ctx))
        }
        (Accessor::Add, Some((value, index))) => {
            format!("{} += {}", access(index), value.to_source(ctx))
        }
        (Accessor::Remove, Some((value, index))) => {
            format!("{} -= {}", access(index), value.to_source(ctx))
        }
        (_, None) => access(&[]),
    }
}

impl ToSource for Statement {
    fn to_source(&self, ctx: &PrintContext<'_>) -> String {
        let mut out = String::new();
        write_statement(&mut out, self, 0, ctx);
        out.trim_end().to_string()
    }
}

fn write_statement(out: &mut String, statement: &Statement, depth: usize, ctx: &PrintContext<'_>) {
    let pad = INDENT.repeat(depth);
    match statement {
        Statement::Expression(e) => out.push_str(&format!("{pad}{};\n", e.to_source(ctx))),
        Statement::Return(None) => out.push_str(&format!("{pad}return;\n")),
        Statement::Return(Some(e)) => out.push_str(&format!("{pad}return {};\n", e.to_source(ctx))),
        Statement::Assign { target, value } => out.push_str(&format!(
            "{pad}{} = {};\n",
            target.to_source(ctx),
            value.to_source(ctx)
        )),
        Statement::Declare { name, value } => {
            out.push_str(&format!("{pad}var {name} = {};\n", value.to_source(ctx)))
        }
        Statement::If {
            condition,
            then_branch,
            else_branch,
        } => {
            out.push_str(&format!("{pad}if ({}) {{\n", condition.to_source(ctx)));
            for s in then_branch {
                write_statement(out, s, depth + 1, ctx);
            }
            match else_branch {
                Some(branch) => {
                    out.push_str(&format!("{pad}}} else {{\n"));
                    for s in branch {
                        write_statement(out, s, depth + 1, ctx);
                    }
                    out.push_str(&format!("{pad}}}\n"));
                }
                None => out.push_str(&format!("{pad}}}\n")),
            }
        }
        Statement::Comment(text) => out.push_str(&format!("{pad}// {text}\n")),
    }
}

fn annotation(a: &Annotation) -> String {
    if a.arguments.is_empty() {
        format!("[{}]", a.name)
    } else {
        format!("[{}({})]", a.name, a.arguments.join(", "))
    }
}

/// Renders a [`WeaveOutput`]
pub struct Printer<'a> {
    output: &'a WeaveOutput,
    ctx: PrintContext<'a>,
}

impl<'a> Printer<'a> {
    pub fn new(output: &'a WeaveOutput) -> Self {
        Self {
            output,
            ctx: PrintContext::new(&output.chain_names),
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let roots = self
            .output
            .declarations
            .iter()
            .filter(|d| d.kind.is_type() && d.parent.is_none());
        for (i, root) in roots.enumerate() {
            if i > 0 {
                out.push('\n');
            }
            out.push_str(&format!("// {}\n", root.unit));
            self.write_type(&mut out, root, 0);
        }
        out
    }

    fn write_type(&self, out: &mut String, declaration: &OutputDeclaration, depth: usize) {
        let pad = INDENT.repeat(depth);
        for a in &declaration.annotations {
            out.push_str(&format!("{pad}{}\n", annotation(a)));
        }
        out.push_str(&format!("{pad}{}class {}", modifiers(declaration), declaration.name));
        if !declaration.interfaces.is_empty() {
            out.push_str(&format!(" : {}", declaration.interfaces.join(", ")));
        }
        out.push_str(" {\n");
        for child in self.output.children(&declaration.key) {
            if child.unit != declaration.unit {
                out.push_str(&format!("{pad}{INDENT}// {}\n", child.unit));
            }
            if child.kind.is_type() {
                self.write_type(out, child, depth + 1);
            } else {
                self.write_member(out, declaration, child, depth + 1);
            }
        }
        out.push_str(&format!("{pad}}}\n"));
    }

    fn write_member(
        &self,
        out: &mut String,
        owner: &OutputDeclaration,
        member: &OutputDeclaration,
        depth: usize,
    ) {
        let pad = INDENT.repeat(depth);
        for a in &member.annotations {
            out.push_str(&format!("{pad}{}\n", annotation(a)));
        }
        let mods = modifiers(member);
        let value_type = member.signature.return_type.as_deref().unwrap_or("object");
        let params = member
            .signature
            .parameters
            .iter()
            .map(|p| format!("{} {}", p.type_name, p.name))
            .collect::<Vec<_>>()
            .join(", ");

        match member.kind {
            DeclarationKind::Method | DeclarationKind::Constructor => {
                let head = if member.kind == DeclarationKind::Constructor {
                    format!("{pad}{mods}{}({params})", owner.name)
                } else {
                    let ret = member.signature.return_type.as_deref().unwrap_or("void");
                    format!("{pad}{mods}{ret} {}({params})", member.name)
                };
                match member.body(Accessor::Body) {
                    Some(body) => {
                        out.push_str(&head);
                        out.push_str(" {\n");
                        self.write_body(out, &body.statements, depth + 1);
                        out.push_str(&format!("{pad}}}\n"));
                    }
                    None => out.push_str(&format!("{head};\n")),
                }
            }
            DeclarationKind::Field => {
                out.push_str(&format!("{pad}{mods}{value_type} {}", member.name));
                if let Some(init) = &member.initializer {
                    out.push_str(&format!(" = {}", init.to_source(&self.ctx)));
                }
                out.push_str(";\n");
            }
            DeclarationKind::Property | DeclarationKind::Indexer | DeclarationKind::Event => {
                let head = match member.kind {
                    DeclarationKind::Indexer => format!("{pad}{mods}{value_type} this[{params}]"),
                    DeclarationKind::Event => {
                        format!("{pad}{mods}event {value_type} {}", member.name)
                    }
                    _ => format!("{pad}{mods}{value_type} {}", member.name),
                };
                out.push_str(&head);
                out.push_str(" {\n");
                let inner = INDENT.repeat(depth + 1);
                for (accessor, output) in &member.accessors {
                    match &output.body {
                        Some(body) => {
                            out.push_str(&format!("{inner}{accessor} {{\n"));
                            self.write_body(out, &body.statements, depth + 2);
                            out.push_str(&format!("{inner}}}\n"));
                        }
                        None => out.push_str(&format!("{inner}{accessor};\n")),
                    }
                }
                out.push_str(&format!("{pad}}}"));
                if let Some(init) = &member.initializer {
                    out.push_str(&format!(" = {};", init.to_source(&self.ctx)));
                }
                out.push('\n');
            }
            DeclarationKind::Type => {}
        }
    }

    fn write_body(&self, out: &mut String, statements: &[Statement], depth: usize) {
        for s in statements {
            write_statement(out, s, depth, &self.ctx);
        }
    }
}

fn modifiers(declaration: &OutputDeclaration) -> String {
    declaration
        .modifiers
        .iter()
        .map(|m| format!("{m} "))
        .collect()
}

/// Render a woven declaration set
pub fn render(output: &WeaveOutput) -> String {
    Printer::new(output).render()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx_with(names: &IndexMap<ChainElementId, String>) -> PrintContext<'_> {
        PrintContext::new(names)
    }

    #[test]
    fn test_chain_call_prints_element_name() {
        let mut names = IndexMap::new();
        names.insert(ChainElementId(4), "Total_Logging".to_string());
        let ctx = ctx_with(&names);
        let call = Expression::ChainCall {
            element: ChainElementId(4),
            accessor: Accessor::Body,
            arguments: vec![Expression::ident("quantity")],
        };
        assert_eq!(call.to_source(&ctx), "this.Total_Logging(quantity)");
    }

    #[test]
    fn test_forward_renders_per_accessor() {
        let names = IndexMap::new();
        let ctx = ctx_with(&names);
        let target = DeclarationKey::new("Order::DisplayName");
        let value = vec![Expression::ident("value")];

        let get = Expression::Forward {
            target: target.clone(),
            accessor: Accessor::Get,
            arguments: vec![],
        };
        let set = Expression::Forward {
            target: target.clone(),
            accessor: Accessor::Set,
            arguments: value.clone(),
        };
        let add = Expression::Forward {
            target: DeclarationKey::new("Order::Changed"),
            accessor: Accessor::Add,
            arguments: value,
        };
        assert_eq!(get.to_source(&ctx), "this.DisplayName");
        assert_eq!(set.to_source(&ctx), "this.DisplayName = value");
        assert_eq!(add.to_source(&ctx), "this.Changed += value");
    }

    #[test]
    fn test_nested_statements_are_indented() {
        let names = IndexMap::new();
        let ctx = ctx_with(&names);
        let statement = Statement::If {
            condition: Expression::binary(
                "==",
                Expression::ident("x"),
                Expression::Literal(Literal::Null),
            ),
            then_branch: vec![Statement::Return(None)],
            else_branch: Some(vec![Statement::expr(Expression::call(
                "Log",
                vec![Expression::string("a \"b\"")],
            ))]),
        };
        assert_eq!(
            statement.to_source(&ctx),
            "if (x == null) {\n    return;\n} else {\n    Log(\"a \\\"b\\\"\");\n}"
        );
    }
}
