//! Connectivity status, IP family and transport-error types

use std::fmt;

/// Internet connectivity verdict, from worst to best (display ordering only)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum InternetStatus {
    Unknown = 0,
    NotAvailable = 1,
    Limited = 2,
    CaptivePortal = 3,
    FullyConnected = 4,
}

impl InternetStatus {
    /// Decode from an atomic u8 slot; unknown values map to `Unknown`
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::NotAvailable,
            2 => Self::Limited,
            3 => Self::CaptivePortal,
            4 => Self::FullyConnected,
            _ => Self::Unknown,
        }
    }

    /// Rank used to pick the better of two per-family verdicts
    pub fn priority(self) -> u8 {
        match self {
            Self::FullyConnected => 4,
            Self::CaptivePortal => 3,
            Self::Limited => 2,
            Self::NotAvailable => 1,
            Self::Unknown => 0,
        }
    }

    /// Map a majority HTTP response code to a verdict.
    /// 204 is the expected no-content answer of a generate_204-style
    /// endpoint; 200 means some middlebox rewrote the response; 302/511
    /// are explicit captive-portal signals.
    pub fn from_response_code(code: u16) -> Self {
        match code {
            204 => Self::FullyConnected,
            200 => Self::Limited,
            302 | 511 => Self::CaptivePortal,
            _ => Self::NotAvailable,
        }
    }
}

impl fmt::Display for InternetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::NotAvailable => "not-available",
            Self::Limited => "limited",
            Self::CaptivePortal => "captive-portal",
            Self::FullyConnected => "fully-connected",
        };
        f.write_str(s)
    }
}

/// IP family a probe is pinned to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum IpFamily {
    V4 = 0,
    V6 = 1,
    /// Whichever family the monitor is currently authoritative for
    Unspecified = 2,
}

impl IpFamily {
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::V6,
            2 => Self::Unspecified,
            _ => Self::V4,
        }
    }
}

impl fmt::Display for IpFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::V4 => "IPv4",
            Self::V6 => "IPv6",
            Self::Unspecified => "any",
        };
        f.write_str(s)
    }
}

/// Classification of a failed HTTP attempt (no response code collected)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum TransportError {
    None = 0,
    CouldNotResolveHost = 1,
    TimedOut = 2,
    ConnectFailed = 3,
    RecvError = 4,
    Other = 5,
}

impl TransportError {
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::CouldNotResolveHost,
            2 => Self::TimedOut,
            3 => Self::ConnectFailed,
            4 => Self::RecvError,
            5 => Self::Other,
            _ => Self::None,
        }
    }

    /// True for failures where re-checking DNS can tell "recovered" from "still down"
    pub fn is_dns_class(self) -> bool {
        matches!(
            self,
            Self::CouldNotResolveHost | Self::TimedOut | Self::RecvError
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_code_mapping() {
        assert_eq!(
            InternetStatus::from_response_code(204),
            InternetStatus::FullyConnected
        );
        assert_eq!(
            InternetStatus::from_response_code(200),
            InternetStatus::Limited
        );
        assert_eq!(
            InternetStatus::from_response_code(302),
            InternetStatus::CaptivePortal
        );
        assert_eq!(
            InternetStatus::from_response_code(511),
            InternetStatus::CaptivePortal
        );
        assert_eq!(
            InternetStatus::from_response_code(404),
            InternetStatus::NotAvailable
        );
        assert_eq!(
            InternetStatus::from_response_code(503),
            InternetStatus::NotAvailable
        );
    }

    #[test]
    fn status_u8_round_trip() {
        for s in [
            InternetStatus::Unknown,
            InternetStatus::NotAvailable,
            InternetStatus::Limited,
            InternetStatus::CaptivePortal,
            InternetStatus::FullyConnected,
        ] {
            assert_eq!(InternetStatus::from_u8(s as u8), s);
        }
    }

    #[test]
    fn dns_class_errors() {
        assert!(TransportError::CouldNotResolveHost.is_dns_class());
        assert!(TransportError::TimedOut.is_dns_class());
        assert!(TransportError::RecvError.is_dns_class());
        assert!(!TransportError::ConnectFailed.is_dns_class());
        assert!(!TransportError::None.is_dns_class());
    }
}
