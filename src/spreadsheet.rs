//! Spreadsheet ingest.
//!
//! Leads arrive as a delimited text export of the sales spreadsheet. Headers
//! are collapsed with [`normalize_header`] and matched against the column
//! names below; cells are trimmed and blanks become `None`.

use crate::errors::{AppError, ResultExt};
use crate::models::LeadRow;
use crate::normalize::{non_blank, normalize_header};
use std::collections::HashMap;
use std::path::Path;

/// Normalized header names.
pub mod columns {
    pub const TITLE: &str = "t_tulo_do_neg_cio";
    pub const NETWORK: &str = "rede_do_neg_cio";
    pub const DATE: &str = "data";
    pub const CLIENT_TYPE: &str = "classifica_o_estrat_gico_spot_do_neg_cio";
    pub const FUNNEL: &str = "funil";
    pub const REPRESENTATIVE: &str = "representante_do_neg_cio";
    pub const OWNER: &str = "respons_vel_do_neg_cio";
    pub const CITY: &str = "cidade_do_cliente";
    pub const STATE: &str = "estado_do_cliente";
    pub const POSTAL_CODE: &str = "cep_do_cliente";
    pub const DELIVERY_LOCATION: &str = "local_de_entrega";
    pub const CLIENT_ADDRESS: &str = "endere_o_do_cliente";
    pub const SALE_VALUE: &str = "valor";
    /// Optional operator override used as the most precise location tier.
    pub const ADDRESS_OVERRIDE: &str = "endere_o_a_considerar";

    pub const REQUIRED: [&str; 13] = [
        TITLE,
        NETWORK,
        DATE,
        CLIENT_TYPE,
        FUNNEL,
        REPRESENTATIVE,
        OWNER,
        CITY,
        STATE,
        POSTAL_CODE,
        DELIVERY_LOCATION,
        CLIENT_ADDRESS,
        SALE_VALUE,
    ];
}

/// Reads and parses the spreadsheet export at `path`.
pub async fn read_lead_rows(path: &Path) -> Result<Vec<LeadRow>, AppError> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading spreadsheet {}", path.display()))?;
    let rows = parse_lead_rows(&bytes)?;
    tracing::info!("Read {} rows from {}", rows.len(), path.display());
    Ok(rows)
}

/// Parses a CSV export. The delimiter (`;` or `,`) is sniffed from the header line.
pub fn parse_lead_rows(bytes: &[u8]) -> Result<Vec<LeadRow>, AppError> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let delimiter = sniff_delimiter(bytes);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .has_headers(true)
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .byte_headers()?
        .iter()
        .map(|h| normalize_header(decode_cell(h).trim()))
        .collect();

    let mut index: HashMap<&str, usize> = HashMap::new();
    for (i, header) in headers.iter().enumerate() {
        index.entry(header.as_str()).or_insert(i);
    }

    let missing: Vec<&str> = columns::REQUIRED
        .iter()
        .copied()
        .filter(|c| !index.contains_key(c))
        .collect();
    if !missing.is_empty() {
        return Err(AppError::InputError(format!(
            "spreadsheet is missing required columns: {}",
            missing.join(", ")
        )));
    }
    if !index.contains_key(columns::ADDRESS_OVERRIDE) {
        tracing::debug!("No address override column, precise tier disabled");
    }

    let mut rows = Vec::new();
    for record in reader.byte_records() {
        let record = record?;
        let cell = |name: &str| -> Option<String> {
            let i = *index.get(name)?;
            let raw = record.get(i).map(decode_cell)?;
            non_blank(Some(raw.as_str()))
        };

        let row = LeadRow {
            title: cell(columns::TITLE),
            network: cell(columns::NETWORK),
            date: cell(columns::DATE),
            client_type: cell(columns::CLIENT_TYPE),
            funnel: cell(columns::FUNNEL),
            representative: cell(columns::REPRESENTATIVE),
            owner: cell(columns::OWNER),
            city: cell(columns::CITY),
            state: cell(columns::STATE),
            postal_code: cell(columns::POSTAL_CODE),
            delivery_location: cell(columns::DELIVERY_LOCATION),
            client_address: cell(columns::CLIENT_ADDRESS),
            address_override: cell(columns::ADDRESS_OVERRIDE),
            sale_value: cell(columns::SALE_VALUE),
        };

        if row == LeadRow::default() {
            continue;
        }
        rows.push(row);
    }

    Ok(rows)
}

fn sniff_delimiter(bytes: &[u8]) -> u8 {
    let header_line = bytes.split(|&b| b == b'\n').next().unwrap_or_default();
    let semicolons = header_line.iter().filter(|&&b| b == b';').count();
    let commas = header_line.iter().filter(|&&b| b == b',').count();
    if semicolons > commas {
        b';'
    } else {
        b','
    }
}

/// UTF-8 when valid, otherwise Latin-1 (common for spreadsheet exports).
fn decode_cell(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}
