use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{CallbackQueryId, InlineKeyboardMarkup, MessageId, ParseMode, ReplyParameters};

pub async fn send_html(
    bot: &Bot,
    chat_id: ChatId,
    text: &str,
    reply_to: Option<MessageId>,
    keyboard: Option<InlineKeyboardMarkup>,
) -> Result<Message> {
    let mut request = bot
        .send_message(chat_id, text.to_string())
        .parse_mode(ParseMode::Html);
    if let Some(reply_to) = reply_to {
        request = request.reply_parameters(ReplyParameters::new(reply_to));
    }
    if let Some(keyboard) = keyboard {
        request = request.reply_markup(keyboard);
    }
    Ok(request.await?)
}

pub async fn edit_html(bot: &Bot, chat_id: ChatId, message_id: MessageId, text: &str) -> Result<()> {
    bot.edit_message_text(chat_id, message_id, text.to_string())
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}

pub async fn answer_alert(bot: &Bot, query_id: CallbackQueryId, text: &str) -> Result<()> {
    bot.answer_callback_query(query_id)
        .text(text.to_string())
        .show_alert(true)
        .await?;
    Ok(())
}

pub async fn delete_silently(bot: &Bot, chat_id: ChatId, message_id: MessageId) {
    if let Err(err) = bot.delete_message(chat_id, message_id).await {
        tracing::debug!("delete_message failed: {err}");
    }
}
