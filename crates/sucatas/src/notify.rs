//! Best-effort e-mail alerting for fatal run failures.

use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use sucatas_protocol::MinerConfig;
use tracing::{info, warn};

const SMTP_RELAY: &str = "smtp.gmail.com";

/// Send a fatal-failure alert. Disabled silently when the e-mail settings
/// are absent; a delivery failure is logged, never propagated - alerting
/// must not change the run outcome.
pub async fn send_fatal_alert(config: &MinerConfig, run_id: &str, reason: &str) {
    let (Some(from), Some(password)) = (
        config.email_address.clone(),
        config.email_app_password.clone(),
    ) else {
        info!("e-mail alerting not configured, skipping alert");
        return;
    };
    let to = config.alert_email_to.clone().unwrap_or_else(|| from.clone());

    let subject = format!("[Ache Sucatas] RUN {} FAILED", run_id);
    let body = format!(
        "A execução {} terminou com falha fatal.\n\nMotivo: {}\n\n\
         Consulte pipeline_eventos e miner_execucoes para detalhes.",
        run_id, reason
    );

    let result = tokio::task::spawn_blocking(move || -> Result<(), String> {
        let message = Message::builder()
            .from(from.parse().map_err(|e| format!("from: {e}"))?)
            .to(to.parse().map_err(|e| format!("to: {e}"))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| e.to_string())?;

        let mailer = SmtpTransport::relay(SMTP_RELAY)
            .map_err(|e| e.to_string())?
            .credentials(Credentials::new(from, password))
            .build();
        mailer.send(&message).map_err(|e| e.to_string())?;
        Ok(())
    })
    .await;

    match result {
        Ok(Ok(())) => info!(run_id, "fatal alert e-mail sent"),
        Ok(Err(err)) => warn!(run_id, %err, "fatal alert e-mail failed"),
        Err(err) => warn!(run_id, %err, "fatal alert task panicked"),
    }
}
