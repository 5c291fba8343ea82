//! Chat commands for the Telegram bot.

use crate::charges::{self, NewPixCharge};
use crate::db::AppState;
use crate::error::{AppError, Result};
use crate::models::{AmountInput, normalize_email, telegram_subscriber};
use crate::reconcile;
use crate::util::{format_brl, format_timestamp};

pub const HELP_TEXT: &str = "Comandos disponíveis:\n\
/pix <valor> [email] - gera um PIX para liberar o VIP\n\
/vip - mostra o status do seu VIP";

#[derive(Debug, Clone, PartialEq)]
pub enum BotCommand {
    Start,
    Help,
    Pix {
        amount: Option<String>,
        email: Option<String>,
    },
    Vip,
    Unknown,
}

impl BotCommand {
    pub fn parse(text: &str) -> Self {
        let mut parts = text.split_whitespace();
        let Some(head) = parts.next() else {
            return BotCommand::Unknown;
        };
        // Group chats address commands as /pix@SomeBot
        let command = head.split('@').next().unwrap_or(head).to_lowercase();

        match command.as_str() {
            "/start" => BotCommand::Start,
            "/help" | "/ajuda" => BotCommand::Help,
            "/pix" => BotCommand::Pix {
                amount: parts.next().map(String::from),
                email: parts.next().map(normalize_email),
            },
            "/vip" => BotCommand::Vip,
            _ => BotCommand::Unknown,
        }
    }
}

/// Run a command for `chat_id` and produce the reply text.
pub async fn respond(state: &AppState, chat_id: i64, command: BotCommand) -> String {
    let subscriber = telegram_subscriber(chat_id);

    match command {
        BotCommand::Start => format!("Olá! Pague via PIX para liberar seu VIP.\n\n{}", HELP_TEXT),
        BotCommand::Help | BotCommand::Unknown => HELP_TEXT.to_string(),
        BotCommand::Pix { amount, email } => match create_charge(state, subscriber, amount, email).await {
            Ok(reply) => reply,
            Err(AppError::BadRequest(msg)) => format!("Não foi possível gerar o PIX: {}", msg),
            Err(e) => {
                tracing::error!(chat_id, "Bot PIX creation failed: {}", e);
                "Erro ao gerar o PIX. Tente novamente em instantes.".to_string()
            }
        },
        BotCommand::Vip => match reconcile::vip_status(state, &subscriber).await {
            Ok(status) if status.vip => match status.expires_at {
                Some(exp) => format!("✅ Usuário VIP liberado até {}.", format_timestamp(exp)),
                None => "✅ Usuário VIP liberado!".to_string(),
            },
            Ok(_) => "⏳ Aguardando pagamento... Use /pix <valor> para gerar um PIX.".to_string(),
            Err(e) => {
                tracing::error!(chat_id, "Bot VIP lookup failed: {}", e);
                "Erro ao checar VIP".to_string()
            }
        },
    }
}

async fn create_charge(
    state: &AppState,
    subscriber: String,
    amount: Option<String>,
    email: Option<String>,
) -> Result<String> {
    let amount = amount.ok_or_else(|| AppError::BadRequest("informe o valor, ex: /pix 10,50".into()))?;
    let amount_cents = AmountInput::Text(amount).to_cents()?;

    let charge = charges::create_pix_charge(
        state,
        NewPixCharge {
            subscriber,
            payer_email: email,
            amount_cents,
            description: None,
        },
    )
    .await?;

    Ok(format!(
        "PIX de {} gerado!\n\nCódigo copia e cola:\n{}\n\nAssim que o pagamento for confirmado seu VIP será liberado.",
        format_brl(charge.amount_cents),
        charge.pix_code
    ))
}
