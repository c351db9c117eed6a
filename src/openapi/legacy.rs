//! Rewriting of Go-template placeholders into Jinja expressions
//!
//! Documents written for earlier controller releases use `{{ .Endpoint }}`,
//! `{{ .Target }}` and `{{ StringsJoin .JWTAudiences "," }}`. These are
//! rewritten inside `{{ ... }}` blocks only; text outside expressions is left
//! untouched.

const FIELDS: [(&str, &str); 3] = [
    (".JWTAudiences", "jwt_audiences"),
    (".Endpoint", "endpoint"),
    (".Target", "target"),
];

/// Rewrite legacy placeholders in every `{{ ... }}` expression of `template`
pub fn normalize_placeholders(template: &str) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        let Some(len) = rest[start + 2..].find("}}") else {
            break;
        };
        let expr = &rest[start + 2..start + 2 + len];
        out.push_str(&rest[..start]);
        out.push_str("{{");
        out.push_str(&rewrite_expression(expr));
        out.push_str("}}");
        rest = &rest[start + 2 + len + 2..];
    }
    out.push_str(rest);
    out
}

fn rewrite_expression(expr: &str) -> String {
    let trimmed = expr.trim();
    let rewritten = match trimmed.strip_prefix("StringsJoin") {
        Some(args) if args.starts_with(char::is_whitespace) => rewrite_join(args.trim()),
        _ => None,
    };

    match rewritten {
        Some(joined) => format!(" {joined} "),
        None => {
            let mut expr = expr.to_string();
            for (legacy, name) in FIELDS {
                expr = replace_field(&expr, legacy, name);
            }
            expr
        }
    }
}

/// Replace `legacy` only where it starts a term: at the start of the
/// expression or after whitespace, and not followed by more identifier text.
/// `item.Endpoint` and `.Endpoints` are left alone.
fn replace_field(expr: &str, legacy: &str, name: &str) -> String {
    let mut out = String::with_capacity(expr.len());
    let mut rest = expr;

    while let Some(pos) = rest.find(legacy) {
        out.push_str(&rest[..pos]);
        let starts_term = out
            .chars()
            .next_back()
            .map_or(true, |c| c.is_whitespace() || c == '(');
        let tail = &rest[pos + legacy.len()..];
        let ends_term = tail
            .chars()
            .next()
            .map_or(true, |c| !(c.is_alphanumeric() || c == '_'));

        out.push_str(if starts_term && ends_term { name } else { legacy });
        rest = tail;
    }
    out.push_str(rest);
    out
}

/// `.JWTAudiences ","` becomes `jwt_audiences | join(",")`
fn rewrite_join(args: &str) -> Option<String> {
    let (list, sep) = args.split_once(char::is_whitespace)?;
    let (_, name) = FIELDS.iter().find(|(legacy, _)| *legacy == list)?;
    let sep = sep.trim();
    if sep.len() < 2 || !sep.starts_with('"') || !sep.ends_with('"') {
        return None;
    }
    Some(format!("{name} | join({sep})"))
}
