use crate::errors::AppError;
use crate::formatter::{clean_or_empty, format_date, normalize_guest, DateStyle};
use crate::models::CheckinRequest;
use serde_json::json;
use std::time::Duration;

/// One base64-encoded export document attached to the notification.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub name: String,
    /// Base64 content, already encoded by the formatter.
    pub content: String,
}

/// Client for the transactional email API.
///
/// Wraps one synchronous outbound call per accepted submission; delivery
/// failure is terminal for the request, no retry is attempted.
#[derive(Clone)]
pub struct EmailClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    sender_name: String,
    sender_email: String,
    recipient: String,
}

impl EmailClient {
    pub fn new(
        base_url: String,
        api_key: String,
        sender_name: String,
        sender_email: String,
        recipient: String,
    ) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                AppError::InternalError(format!("Failed to create email client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url,
            api_key,
            sender_name,
            sender_email,
            recipient,
        })
    }

    /// Sends the check-in notification with the export documents attached.
    ///
    /// On a non-success upstream status the caller gets a sanitized,
    /// status-dependent message; the upstream response body is only logged.
    pub async fn send_checkin(
        &self,
        subject: &str,
        body: &str,
        reply_to: Option<&str>,
        attachments: &[Attachment],
    ) -> Result<(), AppError> {
        let url = format!("{}/v3/smtp/email", self.base_url);
        tracing::info!("Dispatching check-in notification: {}", subject);

        let mut payload = json!({
            "sender": { "name": self.sender_name, "email": self.sender_email },
            "to": [{ "email": self.recipient }],
            "subject": subject,
            "textContent": body,
            "attachment": attachments
                .iter()
                .map(|a| json!({ "name": a.name, "content": a.content }))
                .collect::<Vec<_>>(),
        });
        if let Some(reply) = reply_to {
            payload["replyTo"] = json!({ "email": reply });
        }

        let response = self
            .client
            .post(&url)
            .header("api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let user_message = match status.as_u16() {
                429 => "Email service is busy, please try again later",
                401 | 403 => "Email service rejected our credentials, contact the administrator",
                _ => "Email delivery failed, please try again",
            };
            return Err(AppError::DispatchError {
                user_message: user_message.to_string(),
                detail: format!("email API returned {}: {}", status, error_text),
            });
        }

        tracing::info!("✓ Check-in notification dispatched");
        Ok(())
    }
}

/// Subject line interpolating apartment and arrival date.
pub fn checkin_subject(prefix: &str, request: &CheckinRequest) -> String {
    let apartment = clean_or_empty(request.appartamento.as_deref());
    let arrival = format_date(
        &clean_or_empty(request.data_arrivo.as_deref()),
        DateStyle::Slash,
    );
    format!("{} {} - arrivo {}", prefix, apartment, arrival)
}

/// Human-readable plaintext summary of the trip and every guest field,
/// used as the notification body alongside the attachments.
pub fn checkin_summary(request: &CheckinRequest) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Appartamento: {}\n",
        clean_or_empty(request.appartamento.as_deref())
    ));
    out.push_str(&format!(
        "Arrivo: {}\n",
        clean_or_empty(request.data_arrivo.as_deref())
    ));
    out.push_str(&format!(
        "Partenza: {}\n",
        clean_or_empty(request.data_partenza.as_deref())
    ));
    out.push_str(&format!("Notti: {}\n", request.numero_notti.unwrap_or(0)));
    let guest_email = clean_or_empty(request.email_ospite.as_deref());
    if !guest_email.is_empty() {
        out.push_str(&format!("Email ospite: {}\n", guest_email));
    }

    let group_size = request.guests.len();
    for (i, guest) in request.guests.iter().enumerate() {
        let g = normalize_guest(guest, i, group_size);
        out.push_str(&format!("\nOspite {}:\n", i + 1));
        out.push_str(&format!("  Tipo alloggiato: {}\n", g.role.code()));
        out.push_str(&format!("  Cognome: {}\n", g.cognome));
        out.push_str(&format!("  Nome: {}\n", g.nome));
        out.push_str(&format!("  Sesso: {}\n", g.sesso));
        out.push_str(&format!("  Data di nascita: {}\n", g.data_nascita));
        out.push_str(&format!("  Comune di nascita: {}\n", g.comune_nascita));
        out.push_str(&format!("  Provincia di nascita: {}\n", g.provincia_nascita));
        out.push_str(&format!("  Stato di nascita: {}\n", g.stato_nascita));
        out.push_str(&format!("  Cittadinanza: {}\n", g.cittadinanza));
        out.push_str(&format!("  Tipo documento: {}\n", g.tipo_documento));
        out.push_str(&format!("  Numero documento: {}\n", g.numero_documento));
        out.push_str(&format!("  Luogo rilascio: {}\n", g.luogo_rilascio));
    }
    out
}
