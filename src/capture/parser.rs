// SPDX-License-Identifier: Apache-2.0

//! Parser for the SMPP simulator's capture log.
//!
//! Each line is a free-form prefix followed by comma separated `key=value`
//! fields. The first of those names the command; only `submit_sm` lines are turned into records.
//! Optional parameters follow the first `tag` field as `tag`, `len`, `value`
//! triples.

use std::collections::btree_map::Entry;
use std::str::FromStr;

use thiserror::Error;
use tracing::error;

use super::pdu::{SUBMIT_SM, SubmitSm, TAG_MESSAGE_PAYLOAD};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("malformed capture line: {0}")]
    Malformed(String),

    #[error("invalid integer for {key}: {value:?}")]
    InvalidInteger { key: String, value: String },

    #[error("capture line has no TLV block")]
    MissingTlv,

    #[error("duplicate TLV tag {0}")]
    DuplicateTlv(u16),
}

/// Turns a captured line into a record, or `None` when the line is not of
/// interest.
pub trait LineParser: Send + Sync {
    fn parse(&self, line: &str) -> Result<Option<SubmitSm>, ParseError>;
}

#[derive(Debug, Default, Clone)]
pub struct CaptureLineParser;

impl CaptureLineParser {
    pub fn new() -> Self {
        Self
    }
}

impl LineParser for CaptureLineParser {
    fn parse(&self, line: &str) -> Result<Option<SubmitSm>, ParseError> {
        let fields: Vec<&str> = line.split(',').collect();

        let Some(command) = fields.get(1) else {
            return Err(ParseError::Malformed(format!(
                "expected at least two fields, found {}",
                fields.len()
            )));
        };
        if *command != format!("cmd_id={}", SUBMIT_SM) {
            return Ok(None);
        }

        // The first field is the free-form capture prefix
        let pairs = fields[1..]
            .iter()
            .map(|field| {
                field.split_once('=').ok_or_else(|| {
                    ParseError::Malformed(format!("field {:?} is not a key=value pair", field))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        parse_submit_sm(&pairs).map(Some)
    }
}

fn parse_submit_sm(pairs: &[(&str, &str)]) -> Result<SubmitSm, ParseError> {
    let mut pdu = SubmitSm::default();

    for &(key, value) in pairs {
        match key {
            "cmd_id" => pdu.command_id = int(key, value)?,
            "cmd_status" => pdu.command_status = int(key, value)?,
            "seq_no" => pdu.sequence_number = int(key, value)?,
            "service_type" => pdu.service_type = Some(value.to_string()),
            "source_addr_ton" => pdu.source_addr_ton = int(key, value)?,
            "source_addr_npi" => pdu.source_addr_npi = int(key, value)?,
            "source_addr" => pdu.source_addr = value.to_string(),
            "dest_addr_ton" => pdu.dest_addr_ton = int(key, value)?,
            "dest_addr_npi" => pdu.dest_addr_npi = int(key, value)?,
            "dest_addr" => pdu.destination_addr = value.to_string(),
            "esm_class" => pdu.esm_class = int(key, value)?,
            "protocol_ID" => pdu.protocol_id = int(key, value)?,
            "priority_flag" => pdu.priority_flag = int(key, value)?,
            "schedule_delivery_time" => pdu.schedule_delivery_time = Some(value.to_string()),
            "validity_period" => pdu.validity_period = value.to_string(),
            "registered_delivery_flag" => pdu.registered_delivery = int(key, value)?,
            "replace_if_present_flag" => pdu.replace_if_present_flag = int(key, value)?,
            "data_coding" => pdu.data_coding = int(key, value)?,
            "sm_default_msg_id" => pdu.sm_default_msg_id = int(key, value)?,
            "short_message" => {
                pdu.short_message = value.to_string();
                pdu.message = value.to_string();
            }
            _ => {}
        }
    }

    let start = pairs
        .iter()
        .position(|(key, _)| *key == "tag")
        .ok_or(ParseError::MissingTlv)?;

    let mut i = start;
    while i + 2 < pairs.len() {
        let tag: u16 = int("tag", pairs[i].1)?;
        let value = pairs[i + 2].1.trim_end_matches(['\r', '\n']);

        match pdu.tlv_params.entry(tag) {
            Entry::Occupied(_) => return Err(ParseError::DuplicateTlv(tag)),
            Entry::Vacant(slot) => {
                slot.insert(value.to_string());
            }
        }

        if tag == TAG_MESSAGE_PAYLOAD {
            pdu.message = decode_payload(value).replace(['\r', '\n'], " ");
        }

        i += 3;
    }

    Ok(pdu)
}

fn int<T: FromStr>(key: &str, value: &str) -> Result<T, ParseError> {
    value.parse().map_err(|_| ParseError::InvalidInteger {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Decode a hex encoded payload, skipping the leading pair, mapping every
/// byte to the Latin-1 character of the same value. A trailing odd digit is
/// ignored. Undecodable input yields an empty string.
fn decode_payload(value: &str) -> String {
    let Some(digits) = value.get(2..) else {
        if value.len() > 2 {
            error!(value, "Unable to decode message payload");
        }
        return String::new();
    };

    let even = digits.len() - digits.len() % 2;
    match digits.get(..even).map(hex::decode) {
        Some(Ok(bytes)) => bytes.into_iter().map(char::from).collect(),
        Some(Err(e)) => {
            error!(value, error = %e, "Unable to decode message payload");
            String::new()
        }
        None => {
            error!(value, "Unable to decode message payload");
            String::new()
        }
    }
}
