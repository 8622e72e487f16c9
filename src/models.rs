use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::formatter::clean_or_empty;

/// Maximum number of guests accepted in one submission.
pub const MAX_GUESTS: usize = 5;

// ============ API Request Models ============

/// One guest as submitted by the check-in form.
///
/// Every field is optional on the wire; the formatter normalizes missing,
/// empty, `"null"` and `"undefined"` values to empty strings before any
/// padding or mapping is applied.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GuestRecord {
    pub cognome: Option<String>,
    pub nome: Option<String>,
    /// Raw sex code: "1" male, "2" female.
    pub sesso: Option<String>,
    /// ISO date, `YYYY-MM-DD`.
    pub data_nascita: Option<String>,
    pub comune_nascita: Option<String>,
    pub provincia_nascita: Option<String>,
    pub stato_nascita: Option<String>,
    pub cittadinanza: Option<String>,
    pub tipo_documento: Option<String>,
    pub numero_documento: Option<String>,
    pub luogo_rilascio: Option<String>,
    /// Explicit guest role code ("16".."20"); inferred from position when absent.
    pub tipo_alloggiato: Option<String>,
}

/// Full check-in submission payload.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CheckinRequest {
    pub appartamento: Option<String>,
    /// ISO date, `YYYY-MM-DD`.
    pub data_arrivo: Option<String>,
    /// ISO date, `YYYY-MM-DD`.
    pub data_partenza: Option<String>,
    pub numero_notti: Option<u32>,
    pub email_ospite: Option<String>,
    /// Hidden anti-bot field; must stay empty for real submissions.
    pub honeypot: Option<String>,
    pub guests: Vec<GuestRecord>,
}

impl CheckinRequest {
    /// Validates required fields before any formatting takes place.
    ///
    /// Trip dates are parsed strictly; guest birth dates are deliberately
    /// not validated here because the formatter degrades malformed birth
    /// dates to blank fields rather than rejecting the submission.
    pub fn validate(&self) -> Result<(), AppError> {
        if clean_or_empty(self.appartamento.as_deref()).is_empty() {
            return Err(AppError::BadRequest(
                "Missing required field: appartamento".to_string(),
            ));
        }

        parse_trip_date(self.data_arrivo.as_deref(), "dataArrivo")?;
        parse_trip_date(self.data_partenza.as_deref(), "dataPartenza")?;

        match self.numero_notti {
            None => {
                return Err(AppError::BadRequest(
                    "Missing required field: numeroNotti".to_string(),
                ))
            }
            Some(0) => {
                return Err(AppError::BadRequest(
                    "numeroNotti must be at least 1".to_string(),
                ))
            }
            Some(_) => {}
        }

        if self.guests.is_empty() {
            return Err(AppError::BadRequest(
                "At least one guest is required".to_string(),
            ));
        }
        if self.guests.len() > MAX_GUESTS {
            return Err(AppError::BadRequest(format!(
                "Too many guests: maximum {} per submission",
                MAX_GUESTS
            )));
        }

        for (i, guest) in self.guests.iter().enumerate() {
            if clean_or_empty(guest.cognome.as_deref()).is_empty() {
                return Err(AppError::BadRequest(format!(
                    "Missing cognome for guest {}",
                    i + 1
                )));
            }
            if clean_or_empty(guest.nome.as_deref()).is_empty() {
                return Err(AppError::BadRequest(format!(
                    "Missing nome for guest {}",
                    i + 1
                )));
            }
        }

        Ok(())
    }
}

/// Parses a trip date strictly as `YYYY-MM-DD`.
fn parse_trip_date(value: Option<&str>, field: &str) -> Result<NaiveDate, AppError> {
    let cleaned = clean_or_empty(value);
    if cleaned.is_empty() {
        return Err(AppError::BadRequest(format!(
            "Missing required field: {}",
            field
        )));
    }
    NaiveDate::parse_from_str(&cleaned, "%Y-%m-%d").map_err(|_| {
        AppError::BadRequest(format!("{} must be a valid YYYY-MM-DD date", field))
    })
}

// ============ API Response Models ============

/// Success payload for accepted submissions.
#[derive(Debug, Serialize)]
pub struct CheckinResponse {
    pub status: String,
    pub message: String,
}

impl CheckinResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: "ok".to_string(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_request() -> CheckinRequest {
        CheckinRequest {
            appartamento: Some("Trilo".to_string()),
            data_arrivo: Some("2024-07-01".to_string()),
            data_partenza: Some("2024-07-05".to_string()),
            numero_notti: Some(4),
            guests: vec![GuestRecord {
                cognome: Some("Rossi".to_string()),
                nome: Some("Mario".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn valid_request_passes() {
        assert!(valid_request().validate().is_ok());
    }

    #[test]
    fn missing_apartment_rejected() {
        let mut req = valid_request();
        req.appartamento = None;
        let err = req.validate().unwrap_err();
        assert!(err.to_string().contains("appartamento"));

        req.appartamento = Some("undefined".to_string());
        assert!(req.validate().is_err());
    }

    #[test]
    fn malformed_trip_dates_rejected() {
        let mut req = valid_request();
        req.data_arrivo = Some("01/07/2024".to_string());
        assert!(req.validate().is_err());

        let mut req = valid_request();
        req.data_partenza = Some("2024-13-40".to_string());
        assert!(req.validate().is_err());
    }

    #[test]
    fn guest_count_bounds_enforced() {
        let mut req = valid_request();
        req.guests.clear();
        assert!(req.validate().is_err());

        let mut req = valid_request();
        let guest = req.guests[0].clone();
        req.guests = vec![guest; MAX_GUESTS + 1];
        let err = req.validate().unwrap_err();
        assert!(err.to_string().contains("Too many guests"));
    }

    #[test]
    fn zero_nights_rejected() {
        let mut req = valid_request();
        req.numero_notti = Some(0);
        assert!(req.validate().is_err());
    }

    #[test]
    fn guest_without_name_rejected() {
        let mut req = valid_request();
        req.guests[0].nome = Some("  ".to_string());
        let err = req.validate().unwrap_err();
        assert!(err.to_string().contains("guest 1"));
    }

    #[test]
    fn deserializes_italian_wire_names() {
        let body = serde_json::json!({
            "appartamento": "Bilo",
            "dataArrivo": "2024-07-01",
            "dataPartenza": "2024-07-03",
            "numeroNotti": 2,
            "guests": [{
                "cognome": "Rossi",
                "nome": "Mario",
                "dataNascita": "1990-05-20",
                "comuneNascita": "408037006",
                "tipoAlloggiato": "16"
            }]
        });
        let req: CheckinRequest = serde_json::from_value(body).unwrap();
        assert_eq!(req.data_arrivo.as_deref(), Some("2024-07-01"));
        assert_eq!(req.guests[0].data_nascita.as_deref(), Some("1990-05-20"));
        assert_eq!(req.guests[0].tipo_alloggiato.as_deref(), Some("16"));
    }
}
