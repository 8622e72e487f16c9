/// Record Formatter: turns a validated check-in submission into the two
/// export documents required by the Italian hospitality back-office:
///
/// 1. The Alloggiati Web fixed-width record set (one 168-character line per
///    guest, the police registration "schedine" layout).
/// 2. The GIES interchange document, in two equivalent renderings: a
///    pipe-delimited record set (HDR/MOV/ARR/PAR/PRE/END) and an XML
///    document carrying the same ARR/PAR/PRE data.
///
/// All field normalization lives here: case folding, fixed-width padding
/// and truncation, date reformatting, nationality-dependent substitution
/// and guest role inference. Formatting never fails for well-typed input;
/// malformed birth dates degrade to blank fields because the downstream
/// systems tolerate blank dates but not malformed ones.
use base64::Engine;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::models::{CheckinRequest, GuestRecord};

/// Citizenship code denoting Italian nationality. This single sentinel
/// drives divergent field population: birth municipality/province are
/// emitted only for Italians, while foreigners get birth-state and
/// document issue-place forced to their citizenship code.
pub const ITALY_CODE: &str = "100000100";

/// Date rendering used by an export variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateStyle {
    /// `dd/mm/yyyy`, 10 characters (Alloggiati Web).
    Slash,
    /// `ddmmyy`, 6 characters (GIES).
    Compact,
}

/// Guest role codes of the Alloggiati Web tracciato.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuestRole {
    SingleGuest,
    HeadOfFamily,
    HeadOfGroup,
    FamilyMember,
    GroupMember,
}

impl GuestRole {
    pub fn code(self) -> u8 {
        match self {
            GuestRole::SingleGuest => 16,
            GuestRole::HeadOfFamily => 17,
            GuestRole::HeadOfGroup => 18,
            GuestRole::FamilyMember => 19,
            GuestRole::GroupMember => 20,
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "16" => Some(GuestRole::SingleGuest),
            "17" => Some(GuestRole::HeadOfFamily),
            "18" => Some(GuestRole::HeadOfGroup),
            "19" => Some(GuestRole::FamilyMember),
            "20" => Some(GuestRole::GroupMember),
            _ => None,
        }
    }
}

// ============ Normalization primitives ============

/// Normalizes a loosely-typed form value: missing, blank, `"null"` and the
/// literal string `"undefined"` all become the empty string. Applied
/// uniformly before any padding or mapping.
pub fn clean_or_empty(value: Option<&str>) -> String {
    match value {
        Some(v) => {
            let trimmed = v.trim();
            if trimmed.is_empty()
                || trimmed.eq_ignore_ascii_case("undefined")
                || trimmed.eq_ignore_ascii_case("null")
            {
                String::new()
            } else {
                trimmed.to_string()
            }
        }
        None => String::new(),
    }
}

/// Text field: optional uppercase, truncate to `width` characters, then
/// right-pad with spaces to exactly `width`.
pub fn pad_text(value: &str, width: usize, uppercase: bool) -> String {
    let folded = if uppercase {
        value.to_uppercase()
    } else {
        value.to_string()
    };
    let mut out: String = folded.chars().take(width).collect();
    let len = out.chars().count();
    for _ in len..width {
        out.push(' ');
    }
    out
}

/// Numeric field: digits only, left-padded with zeros to exactly `width`.
/// Overlong values keep the least significant digits.
pub fn pad_num(value: &str, width: usize) -> String {
    let digits: String = value.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() >= width {
        digits[digits.len() - width..].to_string()
    } else {
        format!("{}{}", "0".repeat(width - digits.len()), digits)
    }
}

/// Reformats an ISO `YYYY-MM-DD` date into the requested export style.
/// Anything that does not split into exactly three non-empty segments
/// degrades to the empty string; the caller pads it to field width.
pub fn format_date(iso: &str, style: DateStyle) -> String {
    let parts: Vec<&str> = iso.split('-').collect();
    if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
        return String::new();
    }
    let year = format!("{:0>4}", parts[0]);
    let month = format!("{:0>2}", parts[1]);
    let day = format!("{:0>2}", parts[2]);
    match style {
        DateStyle::Slash => format!("{}/{}/{}", day, month, year),
        DateStyle::Compact => {
            // Char-safe two-digit year; the input is untrusted text.
            let chars: Vec<char> = year.chars().collect();
            let yy: String = chars[chars.len().saturating_sub(2)..].iter().collect();
            format!("{}{}{}", day, month, yy)
        }
    }
}

/// Escapes the five XML special characters in element/attribute content.
pub fn xml_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

// ============ Field derivation ============

/// Resolves the effective guest role.
///
/// An explicit role code wins, with one exception: an explicit single-guest
/// on the first position of a multi-guest submission is promoted to
/// head-of-family. Without an explicit code the role is inferred from
/// position: first of many is head-of-family, first and alone is
/// single-guest, everyone else is a family member.
pub fn effective_role(explicit: Option<&str>, index: usize, group_size: usize) -> GuestRole {
    let cleaned = clean_or_empty(explicit);
    match GuestRole::from_code(&cleaned) {
        Some(GuestRole::SingleGuest) if index == 0 && group_size > 1 => GuestRole::HeadOfFamily,
        Some(role) => role,
        None => {
            if index == 0 {
                if group_size > 1 {
                    GuestRole::HeadOfFamily
                } else {
                    GuestRole::SingleGuest
                }
            } else {
                GuestRole::FamilyMember
            }
        }
    }
}

/// Maps common document-type spellings to their 5-character export codes.
/// Unmapped values pass through unchanged.
pub fn map_document_type(raw: &str) -> String {
    match raw.trim().to_uppercase().as_str() {
        "PASSAPORTO" | "PASSPORT" | "PASOR" => "PASOR".to_string(),
        "CARTA IDENTITA" | "CARTA D'IDENTITA" | "CI" | "ID" | "IDENT" => "IDENT".to_string(),
        "PATENTE" | "PATENTE DI GUIDA" | "DL" | "PATEN" => "PATEN".to_string(),
        _ => raw.trim().to_string(),
    }
}

/// GIES sex rendering: raw "1"/"2" codes map to "M"/"F", anything else
/// renders empty. The Alloggiati record keeps the raw numeric code.
pub fn map_sex_code(raw: &str) -> &'static str {
    match raw.trim() {
        "1" => "M",
        "2" => "F",
        _ => "",
    }
}

/// Maps the free-text apartment identifier to its fixed structure code,
/// with a default fallback for unknown identifiers.
pub fn structure_code(apartment: &str) -> &'static str {
    match apartment.trim().to_uppercase().as_str() {
        "TRILO" | "TRILOCALE" => "APT001",
        "BILO" | "BILOCALE" => "APT002",
        "MONO" | "MONOLOCALE" => "APT003",
        _ => "APT000",
    }
}

/// A guest with every export field cleaned and the nationality and
/// role rules already applied.
#[derive(Debug, Clone)]
pub struct NormalizedGuest {
    pub role: GuestRole,
    pub cognome: String,
    pub nome: String,
    pub sesso: String,
    /// Still ISO formatted; rendered per export variant.
    pub data_nascita: String,
    pub comune_nascita: String,
    pub provincia_nascita: String,
    pub stato_nascita: String,
    pub cittadinanza: String,
    pub tipo_documento: String,
    pub numero_documento: String,
    pub luogo_rilascio: String,
}

/// Applies the full field-derivation rule set to one submitted guest.
pub fn normalize_guest(guest: &GuestRecord, index: usize, group_size: usize) -> NormalizedGuest {
    let role = effective_role(guest.tipo_alloggiato.as_deref(), index, group_size);

    let mut cittadinanza = clean_or_empty(guest.cittadinanza.as_deref());
    if cittadinanza.is_empty() {
        cittadinanza = ITALY_CODE.to_string();
    }
    let italian = cittadinanza == ITALY_CODE;

    let (comune, provincia) = if italian {
        (
            clean_or_empty(guest.comune_nascita.as_deref()),
            clean_or_empty(guest.provincia_nascita.as_deref()),
        )
    } else {
        // Foreign guests never carry Italian municipality data.
        (String::new(), String::new())
    };

    let stato_nascita = if italian {
        let stato = clean_or_empty(guest.stato_nascita.as_deref());
        if stato.is_empty() {
            cittadinanza.clone()
        } else {
            stato
        }
    } else {
        cittadinanza.clone()
    };

    // Only the first guest carries document fields in the exports.
    let (tipo_documento, numero_documento, luogo_rilascio) = if index == 0 {
        let tipo = clean_or_empty(guest.tipo_documento.as_deref());
        let tipo = if tipo.is_empty() {
            tipo
        } else {
            map_document_type(&tipo)
        };
        let luogo = clean_or_empty(guest.luogo_rilascio.as_deref());
        let luogo = if luogo.is_empty() && !italian {
            cittadinanza.clone()
        } else {
            luogo
        };
        (
            tipo,
            clean_or_empty(guest.numero_documento.as_deref()),
            luogo,
        )
    } else {
        (String::new(), String::new(), String::new())
    };

    NormalizedGuest {
        role,
        cognome: clean_or_empty(guest.cognome.as_deref()),
        nome: clean_or_empty(guest.nome.as_deref()),
        sesso: clean_or_empty(guest.sesso.as_deref()),
        data_nascita: clean_or_empty(guest.data_nascita.as_deref()),
        comune_nascita: comune,
        provincia_nascita: provincia,
        stato_nascita,
        cittadinanza,
        tipo_documento,
        numero_documento,
        luogo_rilascio,
    }
}

// ============ Alloggiati Web export ============

/// Builds the fixed-width Alloggiati Web export: one 168-character line
/// per guest, CRLF joined. Field order and widths follow the tracciato
/// record for schedine uploads.
pub fn build_alloggiati(request: &CheckinRequest) -> String {
    let arrivo = format_date(
        &clean_or_empty(request.data_arrivo.as_deref()),
        DateStyle::Slash,
    );
    let notti = request.numero_notti.unwrap_or(0).to_string();
    let group_size = request.guests.len();

    let lines: Vec<String> = request
        .guests
        .iter()
        .enumerate()
        .map(|(i, guest)| {
            let g = normalize_guest(guest, i, group_size);
            let mut line = String::with_capacity(168);
            line.push_str(&pad_num(&g.role.code().to_string(), 2));
            line.push_str(&pad_text(&arrivo, 10, false));
            line.push_str(&pad_num(&notti, 2));
            line.push_str(&pad_text(&g.cognome, 50, true));
            line.push_str(&pad_text(&g.nome, 30, true));
            line.push_str(&pad_text(&g.sesso, 1, false));
            line.push_str(&pad_text(
                &format_date(&g.data_nascita, DateStyle::Slash),
                10,
                false,
            ));
            line.push_str(&pad_text(&g.comune_nascita, 9, true));
            line.push_str(&pad_text(&g.provincia_nascita, 2, true));
            line.push_str(&pad_text(&g.stato_nascita, 9, false));
            line.push_str(&pad_text(&g.cittadinanza, 9, false));
            line.push_str(&pad_text(&g.tipo_documento, 5, true));
            line.push_str(&pad_text(&g.numero_documento, 20, true));
            line.push_str(&pad_text(&g.luogo_rilascio, 9, true));
            line
        })
        .collect();

    lines.join("\r\n")
}

// ============ GIES export ============

/// Process-wide monotonic counter seeded from the startup timestamp.
/// Replaces the older truncated-wall-clock scheme, which collided across
/// rapid-fire submissions.
fn guest_id_counter() -> &'static AtomicU64 {
    static COUNTER: OnceLock<AtomicU64> = OnceLock::new();
    COUNTER.get_or_init(|| {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(1);
        AtomicU64::new(seed)
    })
}

pub fn next_guest_id() -> u64 {
    guest_id_counter().fetch_add(1, Ordering::Relaxed)
}

/// Both renderings of the GIES interchange document.
#[derive(Debug, Clone)]
pub struct GiesDocument {
    pub txt: String,
    pub xml: String,
}

/// Builds the GIES export: the pipe-delimited record set and the XML
/// rendering of the same ARR/PAR/PRE data. Record types and field counts
/// are fixed: HDR(5), MOV(6), ARR(9), PAR(8), PRE(3), END(2).
pub fn build_gies(request: &CheckinRequest) -> GiesDocument {
    let struttura = structure_code(&clean_or_empty(request.appartamento.as_deref()));
    let arrivo = format_date(
        &clean_or_empty(request.data_arrivo.as_deref()),
        DateStyle::Compact,
    );
    let partenza = format_date(
        &clean_or_empty(request.data_partenza.as_deref()),
        DateStyle::Compact,
    );
    let notti = request.numero_notti.unwrap_or(0);
    let oggi = Utc::now().format("%d%m%y").to_string();
    let group_size = request.guests.len();

    let guests: Vec<(u64, NormalizedGuest)> = request
        .guests
        .iter()
        .enumerate()
        .map(|(i, guest)| (next_guest_id(), normalize_guest(guest, i, group_size)))
        .collect();

    let mut lines: Vec<String> = Vec::with_capacity(4 + guests.len() * 2);
    lines.push(format!("HDR|GIES|{}|{}|1.0", struttura, oggi));
    lines.push(format!(
        "MOV|{}|{}|{}|{}|{}",
        struttura, arrivo, partenza, notti, group_size
    ));
    for (id, g) in &guests {
        lines.push(format!(
            "ARR|{}|{}|{}|{}|{}|{}|{}|{}",
            id,
            g.cognome.to_uppercase(),
            g.nome.to_uppercase(),
            map_sex_code(&g.sesso),
            format_date(&g.data_nascita, DateStyle::Compact),
            g.cittadinanza,
            g.tipo_documento,
            g.numero_documento.to_uppercase(),
        ));
    }
    for (id, g) in &guests {
        lines.push(format!(
            "PAR|{}|{}|{}|{}|{}|{}|{}",
            id,
            g.role.code(),
            arrivo,
            notti,
            g.comune_nascita.to_uppercase(),
            g.provincia_nascita.to_uppercase(),
            g.stato_nascita,
        ));
    }
    let total_nights = notti as usize * group_size;
    lines.push(format!("PRE|{}|{}", group_size, total_nights));
    // Record count covers every line of the document, END included.
    lines.push(format!("END|{}", 4 + guests.len() * 2));

    let txt = lines.join("\r\n");
    let xml = build_gies_xml(struttura, &arrivo, &partenza, notti, &guests, total_nights);

    GiesDocument { txt, xml }
}

fn build_gies_xml(
    struttura: &str,
    arrivo: &str,
    partenza: &str,
    notti: u32,
    guests: &[(u64, NormalizedGuest)],
    total_nights: usize,
) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\r\n");
    xml.push_str("<gies>\r\n");
    xml.push_str(&format!(
        "  <movimento struttura=\"{}\" arrivo=\"{}\" partenza=\"{}\" notti=\"{}\">\r\n",
        xml_escape(struttura),
        xml_escape(arrivo),
        xml_escape(partenza),
        notti
    ));

    xml.push_str("    <arrivi>\r\n");
    for (id, g) in guests {
        xml.push_str(&format!("      <arrivo id=\"{}\">\r\n", id));
        xml.push_str(&format!(
            "        <cognome>{}</cognome>\r\n",
            xml_escape(&g.cognome.to_uppercase())
        ));
        xml.push_str(&format!(
            "        <nome>{}</nome>\r\n",
            xml_escape(&g.nome.to_uppercase())
        ));
        xml.push_str(&format!(
            "        <sesso>{}</sesso>\r\n",
            map_sex_code(&g.sesso)
        ));
        xml.push_str(&format!(
            "        <dataNascita>{}</dataNascita>\r\n",
            xml_escape(&format_date(&g.data_nascita, DateStyle::Compact))
        ));
        xml.push_str(&format!(
            "        <cittadinanza>{}</cittadinanza>\r\n",
            xml_escape(&g.cittadinanza)
        ));
        xml.push_str(&format!(
            "        <documento tipo=\"{}\">{}</documento>\r\n",
            xml_escape(&g.tipo_documento),
            xml_escape(&g.numero_documento.to_uppercase())
        ));
        xml.push_str("      </arrivo>\r\n");
    }
    xml.push_str("    </arrivi>\r\n");

    xml.push_str("    <partenze>\r\n");
    for (id, g) in guests {
        xml.push_str(&format!(
            "      <partenza id=\"{}\" tipo=\"{}\" arrivo=\"{}\" notti=\"{}\" comune=\"{}\" provincia=\"{}\" stato=\"{}\"/>\r\n",
            id,
            g.role.code(),
            xml_escape(arrivo),
            notti,
            xml_escape(&g.comune_nascita.to_uppercase()),
            xml_escape(&g.provincia_nascita.to_uppercase()),
            xml_escape(&g.stato_nascita),
        ));
    }
    xml.push_str("    </partenze>\r\n");

    xml.push_str(&format!(
        "    <presenze ospiti=\"{}\" notti=\"{}\"/>\r\n",
        guests.len(),
        total_nights
    ));
    xml.push_str("  </movimento>\r\n");
    xml.push_str("</gies>\r\n");
    xml
}

// ============ Transport encoding ============

/// The complete formatter output, ready for attachment assembly.
#[derive(Debug, Clone)]
pub struct ExportBundle {
    pub alloggiati: String,
    pub gies: GiesDocument,
}

pub fn build_exports(request: &CheckinRequest) -> ExportBundle {
    ExportBundle {
        alloggiati: build_alloggiati(request),
        gies: build_gies(request),
    }
}

/// Encodes one export document for transport as an email attachment.
pub fn to_base64(document: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(document.as_bytes())
}
