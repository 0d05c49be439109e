//! Pairing-code linking commands: `paircode`, `link`, `linkinfo`, `unlink`.

use std::{sync::Arc, time::Duration};

use voltron_whatsapp::PairingCodeInfo;

use {
    super::{CommandFuture, CommandServices, MessageContext, SESSION_NOT_FOUND},
    crate::session::SessionBot,
};

/// How long to wait for a requested code before reporting it.
pub const PAIR_CODE_FOLLOW_UP_DELAY: Duration = Duration::from_secs(10);

const LINK_STEPS: &str = "1. Open WhatsApp\n2. Go to Settings → Linked Devices\n3. Tap \"Link a Device\"";

fn code_of(info: &PairingCodeInfo) -> &str {
    info.code.as_deref().unwrap_or_default()
}

fn code_panel(title: &str, session_id: &str, info: &PairingCodeInfo) -> String {
    let code = code_of(info);
    format!(
        "📱 *{title} - {session_id}*\n\n🔢 *YOUR PAIR CODE:* {code}\n\n📝 *HOW TO USE:*\n\
         {LINK_STEPS}\n4. Enter this code: *{code}*\n\n⏰ *Expires in:* {} seconds\n\
         ⚡ *Session:* {session_id}",
        info.expires_in
    )
}

fn link_code_reply(session_id: &str, info: &PairingCodeInfo) -> String {
    format!(
        "🔢 *YOUR PAIR CODE:* {}\n\n💡 *Enter this code in WhatsApp*\n\n⏰ *Code expires in:* {} \
         seconds\n🔐 *Session:* {session_id}\n\n✅ After entering code, you'll be connected!",
        code_of(info),
        info.expires_in
    )
}

/// Report the freshly requested code once the delay has passed.
fn schedule_code_report(
    services: &CommandServices,
    ctx: MessageContext,
    bot: Arc<SessionBot>,
    render: fn(&str, &PairingCodeInfo) -> String,
    failure: String,
) {
    let key = bot.id().to_string();
    let session_id = key.clone();
    services
        .follow_ups
        .schedule(&key, PAIR_CODE_FOLLOW_UP_DELAY, async move {
            let info = bot.pairing_code_info();
            let text = if info.is_live() {
                render(&session_id, &info)
            } else {
                failure
            };
            ctx.reply(&text).await;
        });
}

pub(super) fn paircode(
    ctx: MessageContext,
    services: CommandServices,
    session_id: String,
) -> CommandFuture {
    Box::pin(async move {
        let Some(bot) = services.directory.session(&session_id).await else {
            ctx.reply(SESSION_NOT_FOUND).await;
            return;
        };

        let info = bot.pairing_code_info();
        if info.is_live() {
            ctx.reply(&code_panel("ACTIVE PAIR CODE", &session_id, &info))
                .await;
            return;
        }

        bot.generate_new_pair_code().await;
        ctx.reply(&format!(
            "⚡ *GENERATING PAIR CODE - {session_id}*\n\n🔄 Generating new pair code...\n\
             ⏳ Please wait 10 seconds..."
        ))
        .await;

        schedule_code_report(
            &services,
            ctx,
            bot,
            |session_id, info| code_panel("PAIR CODE READY", session_id, info),
            "❌ Failed to generate pair code. Try again.".into(),
        );
    })
}

pub(super) fn link(
    ctx: MessageContext,
    services: CommandServices,
    session_id: String,
) -> CommandFuture {
    Box::pin(async move {
        let Some(bot) = services.directory.session(&session_id).await else {
            ctx.reply(SESSION_NOT_FOUND).await;
            return;
        };

        if bot.is_ready() {
            ctx.reply(&format!(
                "✅ *ALREADY LINKED - {session_id}*\n\n📱 Your WhatsApp is already linked!\n\
                 ⚡ Session: {session_id}\n🔧 Status: ONLINE"
            ))
            .await;
            return;
        }

        bot.generate_new_pair_code().await;
        ctx.reply(&format!(
            "🔗 *WHATSAPP LINKING - {session_id}*\n\n📱 *FOLLOW THESE STEPS:*\n\n\
             {LINK_STEPS}\n4. Wait for code generation...\n\n⚡ Generating your pair code...\n\
             ⏳ Please wait 10 seconds..."
        ))
        .await;

        let failure = format!(
            "❌ Failed to generate pair code. Use {}paircode to try again.",
            bot.prefix()
        );
        schedule_code_report(&services, ctx, bot, link_code_reply, failure);
    })
}

pub(super) fn linkinfo(
    ctx: MessageContext,
    services: CommandServices,
    session_id: String,
) -> CommandFuture {
    Box::pin(async move {
        let Some(bot) = services.directory.session(&session_id).await else {
            ctx.reply(SESSION_NOT_FOUND).await;
            return;
        };

        let info = bot.pairing_code_info();
        let text = if bot.is_ready() {
            format!(
                "✅ *LINKING STATUS - {session_id}*\n\n📱 Status: 🟢 LINKED\n⚡ Session: \
                 {session_id}\n🔧 WhatsApp: CONNECTED\n\n💡 Your WhatsApp is successfully linked!"
            )
        } else if info.is_live() {
            format!(
                "🔗 *LINKING STATUS - {session_id}*\n\n📱 Status: 🔄 AWAITING PAIR CODE\n\
                 🔢 Active Code: {}\n⏰ Expires in: {}s\n\n💡 Use this code in WhatsApp Linked \
                 Devices",
                code_of(&info),
                info.expires_in
            )
        } else {
            format!(
                "🔗 *LINKING STATUS - {session_id}*\n\n📱 Status: 🔴 NO ACTIVE CODE\n\
                 ⚡ Session: {session_id}\n\n💡 Use {}paircode to generate new pair code",
                bot.prefix()
            )
        };
        ctx.reply(&text).await;
    })
}

pub(super) fn unlink(
    ctx: MessageContext,
    services: CommandServices,
    session_id: String,
) -> CommandFuture {
    Box::pin(async move {
        let Some(bot) = services.directory.session(&session_id).await else {
            ctx.reply(SESSION_NOT_FOUND).await;
            return;
        };

        let prefix = bot.prefix();
        let text = if bot.is_ready() {
            format!(
                "🔓 *UNLINK REQUESTED - {session_id}*\n\n📱 To unlink your WhatsApp:\n\n\
                 1. Open WhatsApp on your phone\n2. Go to Settings → Linked Devices\n\
                 3. Find \"{} {session_id}\"\n4. Tap \"Logout\" or \"Unlink\"\n\n\
                 ⚡ Session will be disconnected\n🔧 You can link again anytime with {prefix}link",
                services.settings.bot.name
            )
        } else {
            format!(
                "❌ *NOT LINKED - {session_id}*\n\n📱 Your WhatsApp is not linked to this \
                 session.\n💡 Use {prefix}link to connect first."
            )
        };
        ctx.reply(&text).await;
    })
}
