//! A single decoded event-log entry.

use serde::{Deserialize, Serialize};

use crate::value::DecoderValue;

/// One event from a 1C:Enterprise event-log export.
///
/// All fields except [`data`](Self::data) are copied verbatim from the
/// source. Fields missing from the source are empty strings. The JSON
/// shape (field names and order) is what the log backend indexes on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EventRecord {
    pub level: String,
    pub date: String,
    pub application_name: String,
    pub application_presentation: String,
    pub event: String,
    pub event_presentation: String,
    pub user: String,
    pub user_name: String,
    pub computer: String,
    pub metadata: String,
    pub metadata_presentation: String,
    pub comment: String,

    /// The variable-schema payload.
    pub data: DecoderValue,

    pub data_presentation: String,
    pub transaction_status: String,
    #[serde(rename = "TransactionID")]
    pub transaction_id: String,
    pub connection: String,
    pub session: String,
    pub server_name: String,
    pub port: String,
    pub sync_port: String,
}

impl EventRecord {
    /// Name of the element holding the variable-schema payload.
    pub const DATA_FIELD: &'static str = "Data";

    /// Store a scalar field by its element name.
    ///
    /// Returns `false` if `name` is not a scalar field of the record.
    pub fn set_field(&mut self, name: &str, value: String) -> bool {
        let slot = match name {
            "Level" => &mut self.level,
            "Date" => &mut self.date,
            "ApplicationName" => &mut self.application_name,
            "ApplicationPresentation" => &mut self.application_presentation,
            "Event" => &mut self.event,
            "EventPresentation" => &mut self.event_presentation,
            "User" => &mut self.user,
            "UserName" => &mut self.user_name,
            "Computer" => &mut self.computer,
            "Metadata" => &mut self.metadata,
            "MetadataPresentation" => &mut self.metadata_presentation,
            "Comment" => &mut self.comment,
            "DataPresentation" => &mut self.data_presentation,
            "TransactionStatus" => &mut self.transaction_status,
            "TransactionID" => &mut self.transaction_id,
            "Connection" => &mut self.connection,
            "Session" => &mut self.session,
            "ServerName" => &mut self.server_name,
            "Port" => &mut self.port,
            "SyncPort" => &mut self.sync_port,
            _ => return false,
        };
        *slot = value;
        true
    }
}
