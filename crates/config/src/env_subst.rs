/// Replace `${ENV_VAR}` and `${ENV_VAR:-fallback}` placeholders in raw
/// config text.
///
/// Unresolvable variables without a fallback are left as-is.
pub fn substitute_env(input: &str) -> String {
    substitute_env_with(input, &|name: &str| std::env::var(name).ok())
}

/// Same as [`substitute_env`] with a custom lookup, so callers (and tests)
/// can resolve variables without touching the process environment.
pub(crate) fn substitute_env_with(input: &str, lookup: &dyn Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            // Unterminated: emit the remainder verbatim.
            out.push_str(&rest[start..]);
            return out;
        };

        let expr = &after[..end];
        let (name, fallback) = match expr.split_once(":-") {
            Some((name, fallback)) => (name, Some(fallback)),
            None => (expr, None),
        };

        match (name.is_empty(), lookup(name), fallback) {
            (false, Some(value), _) => out.push_str(&value),
            (false, None, Some(fallback)) => out.push_str(fallback),
            _ => {
                out.push_str("${");
                out.push_str(expr);
                out.push('}');
            },
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "VOLTRON_TEST_NAME" => Some("MEGA-BOT".to_string()),
            _ => None,
        }
    }

    #[test]
    fn substitutes_known_var() {
        assert_eq!(
            substitute_env_with(r#"{"name":"${VOLTRON_TEST_NAME}"}"#, &lookup),
            r#"{"name":"MEGA-BOT"}"#
        );
    }

    #[test]
    fn uses_fallback_for_unknown_var() {
        assert_eq!(substitute_env_with("${MISSING:-3000}", &lookup), "3000");
        assert_eq!(
            substitute_env_with("${VOLTRON_TEST_NAME:-x}", &lookup),
            "MEGA-BOT"
        );
    }

    #[test]
    fn leaves_unknown_var_without_fallback() {
        assert_eq!(substitute_env_with("a ${MISSING} b", &lookup), "a ${MISSING} b");
    }

    #[test]
    fn unterminated_placeholder_is_literal() {
        assert_eq!(substitute_env_with("x ${OPEN", &lookup), "x ${OPEN");
        assert_eq!(substitute_env_with("${}", &lookup), "${}");
    }

    #[test]
    fn no_placeholders() {
        assert_eq!(substitute_env("plain text"), "plain text");
    }
}
