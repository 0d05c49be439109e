use tracing::debug;

/// What a reply template may refer to.
#[derive(Debug, Clone, Copy)]
pub struct ReplyContext<'a> {
    pub bot_name: &'a str,
    pub session_id: &'a str,
    pub online: bool,
}

type Template = fn(&ReplyContext<'_>) -> String;

/// One row of the keyword table.
pub struct KeywordRule {
    pub name: &'static str,
    /// Lowercase substrings; any one of them triggers the rule.
    pub keywords: &'static [&'static str],
    render: Template,
}

impl KeywordRule {
    fn matches(&self, lowered: &str) -> bool {
        self.keywords.iter().any(|k| lowered.contains(k))
    }

    pub fn render(&self, ctx: &ReplyContext<'_>) -> String {
        (self.render)(ctx)
    }
}

fn greeting(ctx: &ReplyContext<'_>) -> String {
    format!(
        "⚡ Hello! I'm {} (Session: {})\nUse \"menu\" for commands!",
        ctx.bot_name, ctx.session_id
    )
}

fn session_info(ctx: &ReplyContext<'_>) -> String {
    format!(
        "🔐 CURRENT SESSION: {}\n⚡ Status: {}",
        ctx.session_id,
        if ctx.online { "ONLINE" } else { "OFFLINE" }
    )
}

fn banner(ctx: &ReplyContext<'_>) -> String {
    format!(
        "⚡ {} at your service! (Session: {})\nUse \"menu\" for commands!",
        ctx.bot_name, ctx.session_id
    )
}

/// Keyword rules in priority order.
pub const RULES: &[KeywordRule] = &[
    KeywordRule {
        name: "greeting",
        keywords: &["hello", "hi", "hey"],
        render: greeting,
    },
    KeywordRule {
        name: "session",
        keywords: &["session"],
        render: session_info,
    },
    KeywordRule {
        name: "banner",
        keywords: &["voltron"],
        render: banner,
    },
];

/// First rule whose keywords occur in `body`, case-insensitively.
pub fn match_rule(body: &str) -> Option<&'static KeywordRule> {
    let lowered = body.to_lowercase();
    RULES.iter().find(|rule| rule.matches(&lowered))
}

/// Canned reply for a non-command message, if any rule fires.
pub fn auto_reply(body: &str, ctx: &ReplyContext<'_>) -> Option<String> {
    let rule = match_rule(body)?;
    debug!(session_id = ctx.session_id, rule = rule.name, "keyword auto-reply");
    Some(rule.render(ctx))
}
