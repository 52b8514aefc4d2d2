//! Paket-Katalog und Kontakt-Kanäle

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// PACKAGES
// ============================================================================

/// Ein buchbares Gesprächspaket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Package {
    pub id: &'static str,
    pub label: &'static str,
    pub minutes: u32,
    /// Preis in Cent (EUR)
    pub price_cents: u32,
}

impl Package {
    /// Gesprächsdauer in Sekunden
    pub fn seconds(&self) -> u32 {
        self.minutes * 60
    }

    /// Preis formatiert, z.B. `18,00 €`
    pub fn price_display(&self) -> String {
        format!("{},{:02} €", self.price_cents / 100, self.price_cents % 100)
    }
}

/// Fester Katalog; nur diese Pakete können ausgewählt werden
pub const PACKAGES: [Package; 4] = [
    Package {
        id: "5min",
        label: "5 minutes",
        minutes: 5,
        price_cents: 1000,
    },
    Package {
        id: "10min",
        label: "10 minutes",
        minutes: 10,
        price_cents: 1800,
    },
    Package {
        id: "15min",
        label: "15 minutes",
        minutes: 15,
        price_cents: 2500,
    },
    Package {
        id: "30min",
        label: "30 minutes",
        minutes: 30,
        price_cents: 4500,
    },
];

/// Sucht ein Paket im Katalog
pub fn find_package(id: &str) -> Option<Package> {
    PACKAGES.iter().copied().find(|p| p.id == id)
}

// ============================================================================
// CONTACT CHANNELS
// ============================================================================

/// Kanal über den der Besucher den Link erhalten möchte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactChannel {
    WhatsApp,
    Telegram,
    Email,
}

impl ContactChannel {
    pub const ALL: [ContactChannel; 3] = [
        ContactChannel::WhatsApp,
        ContactChannel::Telegram,
        ContactChannel::Email,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ContactChannel::WhatsApp => "WhatsApp",
            ContactChannel::Telegram => "Telegram",
            ContactChannel::Email => "Email",
        }
    }

    /// Platzhalter für das Eingabefeld
    pub fn placeholder(self) -> &'static str {
        match self {
            ContactChannel::WhatsApp => "+49 170 1234567",
            ContactChannel::Telegram => "@username",
            ContactChannel::Email => "name@example.com",
        }
    }
}

impl fmt::Display for ContactChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ContactChannel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "whatsapp" => Ok(ContactChannel::WhatsApp),
            "telegram" => Ok(ContactChannel::Telegram),
            "email" | "e-mail" => Ok(ContactChannel::Email),
            other => Err(format!("unknown contact channel: {}", other)),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_package() {
        let package = find_package("10min").unwrap();
        assert_eq!(package.minutes, 10);
        assert_eq!(package.seconds(), 600);
        assert!(find_package("999min").is_none());
    }

    #[test]
    fn test_price_display() {
        assert_eq!(find_package("10min").unwrap().price_display(), "18,00 €");
        let odd = Package {
            id: "x",
            label: "x",
            minutes: 1,
            price_cents: 505,
        };
        assert_eq!(odd.price_display(), "5,05 €");
    }

    #[test]
    fn test_channel_parse() {
        assert_eq!("Email".parse::<ContactChannel>(), Ok(ContactChannel::Email));
        assert_eq!(
            "whatsapp".parse::<ContactChannel>(),
            Ok(ContactChannel::WhatsApp)
        );
        assert!("fax".parse::<ContactChannel>().is_err());
    }
}
