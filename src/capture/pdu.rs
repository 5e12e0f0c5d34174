// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// SMPP command id of `submit_sm`.
pub const SUBMIT_SM: u32 = 4;

/// TLV tag carrying the full message body for long messages.
pub const TAG_MESSAGE_PAYLOAD: u16 = 1060;

/// A `submit_sm` PDU as written to the simulator's capture log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitSm {
    pub command_id: u32,
    pub command_status: u32,
    pub sequence_number: u32,
    pub service_type: Option<String>,
    pub source_addr_ton: u8,
    pub source_addr_npi: u8,
    pub source_addr: String,
    pub dest_addr_ton: u8,
    pub dest_addr_npi: u8,
    pub destination_addr: String,
    pub esm_class: u8,
    pub protocol_id: u8,
    pub priority_flag: u8,
    pub schedule_delivery_time: Option<String>,
    pub validity_period: String,
    pub registered_delivery: u8,
    pub replace_if_present_flag: u8,
    pub data_coding: u8,
    pub sm_default_msg_id: u8,
    pub short_message: String,

    /// Display text: the short message, or the decoded message payload TLV
    /// when one is present.
    pub message: String,
    pub tlv_params: BTreeMap<u16, String>,
}

impl SubmitSm {
    /// Case-sensitive substring match over the text and address fields.
    pub fn contains(&self, needle: &str) -> bool {
        self.message.contains(needle)
            || self.short_message.contains(needle)
            || self.source_addr.contains(needle)
            || self.destination_addr.contains(needle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_camel_case() {
        let mut pdu = SubmitSm {
            command_id: SUBMIT_SM,
            sequence_number: 7,
            source_addr: "1234".to_string(),
            message: "hi".to_string(),
            ..Default::default()
        };
        pdu.tlv_params.insert(TAG_MESSAGE_PAYLOAD, "0x6869".to_string());

        let json = serde_json::to_value(&pdu).unwrap();
        assert_eq!(json["commandId"], 4);
        assert_eq!(json["sequenceNumber"], 7);
        assert_eq!(json["sourceAddr"], "1234");
        assert_eq!(json["serviceType"], serde_json::Value::Null);
        assert_eq!(json["tlvParams"]["1060"], "0x6869");
    }

    #[test]
    fn test_contains() {
        let pdu = SubmitSm {
            source_addr: "34600111222".to_string(),
            destination_addr: "34600999888".to_string(),
            message: "Your code is 1234".to_string(),
            ..Default::default()
        };

        assert!(pdu.contains("code"));
        assert!(pdu.contains("999"));
        assert!(!pdu.contains("CODE"));
    }
}
