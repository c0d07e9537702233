use std::fmt;

use serde::{Deserialize, Serialize};

pub const TIME_CONTACTED: &str = "TimeContacted";

/// Every timestamp field name any known category carries.
///
/// Model types without a table entry are checked against all of these.
pub const ALL_TIMESTAMP_FIELDS: &[&str] = &[
    TIME_CONTACTED,
    "TimeCreated",
    "TimeModified",
    "TimeLastLoggedIn",
    "DateDelivered",
    "DateRead",
    "DatePlayed",
    "TimeStamp",
    "AllTimeStamps",
    "StartTime",
    "LastActivity",
    "Creation",
    "Modification",
    "StartDate",
    "EndDate",
    "Reminder",
    "RepeatUntil",
    "EndTime",
    "Expiry",
    "CreationTime",
    "LastAccessTime",
    "LastVisited",
    "LastConnected",
    "LastConnection",
    "LastAutoConnection",
    "PurchaseDate",
    "DeletedDate",
    "Date",
    "LastLaunch",
    "PurchaseTime",
    "ModifyTime",
    "ActivationTime",
    "ExpirationTime",
    "AccessTime",
    "DeletedTime",
];

/// Record categories found in an extraction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    DataFile,
    Contact,
    UserAccount,
    Party,
    Sms,
    Mms,
    Email,
    MailMessage,
    Call,
    InstantMessage,
    Chat,
    Note,
    CalendarEntry,
    Location,
    Journey,
    Cookie,
    VisitedPage,
    WebBookmark,
    BluetoothDevice,
    WirelessNetwork,
    Voicemail,
    InstalledApplication,
    ApplicationUsage,
    SharedFile,
    SearchedItem,
    PoweringEvent,
    MobileCard,
    IpConnection,
    LogEntry,
    /// A model type with no table entry.
    Other(String),
}

impl Category {
    pub const KNOWN: [Category; 29] = [
        Category::DataFile,
        Category::Contact,
        Category::UserAccount,
        Category::Party,
        Category::Sms,
        Category::Mms,
        Category::Email,
        Category::MailMessage,
        Category::Call,
        Category::InstantMessage,
        Category::Chat,
        Category::Note,
        Category::CalendarEntry,
        Category::Location,
        Category::Journey,
        Category::Cookie,
        Category::VisitedPage,
        Category::WebBookmark,
        Category::BluetoothDevice,
        Category::WirelessNetwork,
        Category::Voicemail,
        Category::InstalledApplication,
        Category::ApplicationUsage,
        Category::SharedFile,
        Category::SearchedItem,
        Category::PoweringEvent,
        Category::MobileCard,
        Category::IpConnection,
        Category::LogEntry,
    ];

    /// Name used by extraction tools for this model type.
    pub fn name(&self) -> &str {
        match self {
            Category::DataFile => "DataFile",
            Category::Contact => "Contact",
            Category::UserAccount => "User",
            Category::Party => "Party",
            Category::Sms => "SMS",
            Category::Mms => "MMS",
            Category::Email => "Email",
            Category::MailMessage => "MailMessage",
            Category::Call => "Call",
            Category::InstantMessage => "InstantMessage",
            Category::Chat => "Chat",
            Category::Note => "Note",
            Category::CalendarEntry => "CalendarEntry",
            Category::Location => "Location",
            Category::Journey => "Journey",
            Category::Cookie => "Cookie",
            Category::VisitedPage => "VisitedPage",
            Category::WebBookmark => "WebBookmark",
            Category::BluetoothDevice => "BluetoothDevice",
            Category::WirelessNetwork => "WirelessNetwork",
            Category::Voicemail => "Voicemail",
            Category::InstalledApplication => "InstalledApplication",
            Category::ApplicationUsage => "ApplicationUsage",
            Category::SharedFile => "SharedFile",
            Category::SearchedItem => "SearchedItem",
            Category::PoweringEvent => "PoweringEvent",
            Category::MobileCard => "MobileCard",
            Category::IpConnection => "IPConnection",
            Category::LogEntry => "LogEntry",
            Category::Other(name) => name.as_str(),
        }
    }

    /// Timestamp fields consulted for this category, in evaluation order.
    pub fn timestamp_fields(&self) -> &'static [&'static str] {
        match self {
            Category::DataFile => &["CreationTime", "ModifyTime", "AccessTime", "DeletedTime"],
            Category::Contact => &[TIME_CONTACTED, "TimeCreated", "TimeModified"],
            Category::UserAccount => &["TimeCreated", "TimeLastLoggedIn"],
            Category::Party => &["DateDelivered", "DateRead", "DatePlayed"],
            Category::Sms => &["TimeStamp", "AllTimeStamps"],
            Category::Mms
            | Category::Email
            | Category::MailMessage
            | Category::Call
            | Category::Location
            | Category::SharedFile
            | Category::SearchedItem
            | Category::PoweringEvent
            | Category::IpConnection
            | Category::LogEntry
            // Duration is a length of time, not a point in time
            | Category::Voicemail => &["TimeStamp"],
            Category::InstantMessage => &[
                "TimeStamp",
                "StartTime",
                "DateDelivered",
                "DateRead",
                "DatePlayed",
                "Date",
            ],
            Category::Chat => &["StartTime", "LastActivity"],
            Category::Note => &["Creation", "Modification"],
            Category::CalendarEntry => &["StartDate", "EndDate", "Reminder", "RepeatUntil"],
            Category::Journey => &["StartTime", "EndTime"],
            Category::Cookie => &["Expiry", "CreationTime", "LastAccessTime"],
            Category::VisitedPage => &["LastVisited"],
            Category::WebBookmark => &["LastVisited", "TimeStamp"],
            Category::BluetoothDevice => &["LastConnected"],
            Category::WirelessNetwork => &["LastConnection", "LastAutoConnection"],
            Category::InstalledApplication => &["PurchaseDate", "DeletedDate"],
            // ActiveTime is a duration
            Category::ApplicationUsage => &["Date", "LastLaunch"],
            Category::MobileCard => &[
                "PurchaseTime",
                "ModifyTime",
                "ActivationTime",
                "ExpirationTime",
            ],
            Category::Other(_) => ALL_TIMESTAMP_FIELDS,
        }
    }
}

impl From<&str> for Category {
    fn from(value: &str) -> Self {
        // tools often qualify the type, e.g. `Data.Models.ContactModels.Contact`
        let name = value.trim().rsplit('.').next().unwrap_or_default();

        Category::KNOWN
            .iter()
            .find(|c| c.name().eq_ignore_ascii_case(name))
            .cloned()
            .unwrap_or_else(|| match name {
                n if n.eq_ignore_ascii_case("UserAccount") => Category::UserAccount,
                n => Category::Other(n.to_string()),
            })
    }
}

impl From<String> for Category {
    fn from(value: String) -> Self {
        Category::from(value.as_str())
    }
}

impl From<Category> for String {
    fn from(value: Category) -> Self {
        value.name().to_string()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
