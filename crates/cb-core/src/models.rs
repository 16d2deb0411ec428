//! Data models for the contacts store

use serde::{Deserialize, Serialize};

/// Which parts of a contact a snapshot fetch should load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactProperties {
    /// Load phones, emails, addresses and the other detail lists
    pub with_properties: bool,
    /// Load the low resolution thumbnail
    pub with_thumbnail: bool,
    /// Load the full resolution photo
    pub with_photo: bool,
}

impl ContactProperties {
    /// Only ids and display names
    pub const fn ids_only() -> Self {
        Self {
            with_properties: false,
            with_thumbnail: false,
            with_photo: false,
        }
    }

    /// Every detail list, optionally with the thumbnail
    pub const fn detailed(with_thumbnail: bool) -> Self {
        Self {
            with_properties: true,
            with_thumbnail,
            with_photo: false,
        }
    }
}

impl Default for ContactProperties {
    fn default() -> Self {
        Self::ids_only()
    }
}

/// Contact record as stored by the platform
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    /// Store-issued identifier
    pub id: String,
    /// Display name
    #[serde(default)]
    pub display_name: String,
    /// Structured name
    #[serde(default)]
    pub name: Name,
    /// Phone numbers
    #[serde(default)]
    pub phones: Vec<Phone>,
    /// Email addresses
    #[serde(default)]
    pub emails: Vec<Email>,
    /// Postal addresses
    #[serde(default)]
    pub addresses: Vec<Address>,
    /// Organizations
    #[serde(default)]
    pub organizations: Vec<Organization>,
    /// Websites
    #[serde(default)]
    pub websites: Vec<String>,
    /// Social media handles
    #[serde(default)]
    pub social_medias: Vec<SocialMedia>,
    /// Birthdays, anniversaries and other dated events
    #[serde(default)]
    pub events: Vec<ContactEvent>,
    /// Notes
    #[serde(default)]
    pub notes: Vec<String>,
    /// Thumbnail bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<Vec<u8>>,
    /// Full resolution photo bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<Vec<u8>>,
    /// Starred / favourite
    #[serde(default)]
    pub is_starred: bool,
}

impl Contact {
    /// Create a new contact with an id and display name
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            ..Default::default()
        }
    }

    /// Add a phone number
    pub fn with_phone(mut self, number: impl Into<String>) -> Self {
        self.phones.push(Phone {
            number: number.into(),
            label: PhoneLabel::Mobile,
        });
        self
    }

    /// Add an email address
    pub fn with_email(mut self, address: impl Into<String>) -> Self {
        self.emails.push(Email {
            address: address.into(),
            label: "home".to_string(),
        });
        self
    }

    /// Add a note
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Set thumbnail bytes
    pub fn with_thumbnail(mut self, thumbnail: Vec<u8>) -> Self {
        self.thumbnail = Some(thumbnail);
        self
    }

    /// Copy of this contact with only the parts selected by `properties`
    pub fn project(&self, properties: &ContactProperties) -> Contact {
        let mut projected = Contact {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
            is_starred: self.is_starred,
            ..Default::default()
        };

        if properties.with_properties {
            projected.name = self.name.clone();
            projected.phones = self.phones.clone();
            projected.emails = self.emails.clone();
            projected.addresses = self.addresses.clone();
            projected.organizations = self.organizations.clone();
            projected.websites = self.websites.clone();
            projected.social_medias = self.social_medias.clone();
            projected.events = self.events.clone();
            projected.notes = self.notes.clone();
        }
        if properties.with_thumbnail {
            projected.thumbnail = self.thumbnail.clone();
        }
        if properties.with_photo {
            projected.photo = self.photo.clone();
        }

        projected
    }
}

/// Structured name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default, Hash)]
#[serde(rename_all = "camelCase")]
pub struct Name {
    #[serde(default)]
    pub first: String,
    #[serde(default)]
    pub last: String,
    #[serde(default)]
    pub middle: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub suffix: String,
    #[serde(default)]
    pub nickname: String,
}

/// Phone label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default, Hash)]
#[serde(rename_all = "camelCase")]
pub enum PhoneLabel {
    #[default]
    Mobile,
    Home,
    Work,
    Main,
    Other,
    Custom(String),
}

/// Phone number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "camelCase")]
pub struct Phone {
    pub number: String,
    #[serde(default)]
    pub label: PhoneLabel,
}

/// Email address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "camelCase")]
pub struct Email {
    pub address: String,
    #[serde(default)]
    pub label: String,
}

/// Postal address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default, Hash)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(default)]
    pub street: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub postal_code: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub label: String,
}

/// Organization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default, Hash)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub department: String,
}

/// Social media handle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "camelCase")]
pub struct SocialMedia {
    pub user_name: String,
    #[serde(default)]
    pub service: String,
}

/// Dated event (birthday, anniversary, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "camelCase")]
pub struct ContactEvent {
    #[serde(default)]
    pub year: Option<i32>,
    pub month: u8,
    pub day: u8,
    #[serde(default)]
    pub label: String,
}
