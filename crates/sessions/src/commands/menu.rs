use std::fmt::Write as _;

use {
    super::{CommandFuture, CommandServices, MessageContext, SESSION_NOT_FOUND},
    crate::status::render_status_panel,
};

const ADMIN_ONLY: &str = "❌ This command is for admins only!";

pub(super) fn menu(
    ctx: MessageContext,
    services: CommandServices,
    session_id: String,
) -> CommandFuture {
    Box::pin(async move {
        let Some(bot) = services.directory.session(&session_id).await else {
            ctx.reply(SESSION_NOT_FOUND).await;
            return;
        };

        let settings = &services.settings;
        let mut text = format!(
            "⚡ *{} v{} - {session_id}*\n\n",
            settings.bot.name, settings.bot.version
        );
        for command in services.registry.iter() {
            let _ = writeln!(
                text,
                "• {}{} - {}",
                bot.prefix(),
                command.name,
                command.description
            );
        }
        let _ = write!(text, "\n🔐 Session: {session_id}");
        ctx.reply(&text).await;
    })
}

pub(super) fn sessions(
    ctx: MessageContext,
    services: CommandServices,
    session_id: String,
) -> CommandFuture {
    Box::pin(async move {
        if services.directory.session(&session_id).await.is_none() {
            ctx.reply(SESSION_NOT_FOUND).await;
            return;
        }

        if !services.settings.is_admin(ctx.message.sender_phone()) {
            ctx.reply(ADMIN_ONLY).await;
            return;
        }

        let statuses = services.directory.statuses().await;
        ctx.reply(&render_status_panel(&statuses)).await;
    })
}
