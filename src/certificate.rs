//! A wrapper around an X.509 certificate.

use base64::prelude::{Engine, BASE64_STANDARD};
use chrono::{FixedOffset, TimeZone, Utc};
use openssl::asn1::{Asn1Time, Asn1TimeRef};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Public};
use openssl::x509::{X509NameRef, X509};

use crate::dcp_time::LocalTime;
use crate::{Error, Result};

/// An X.509 certificate, with the derived values that DCP structures need from it: the
/// distinguished names in their serialized form, the SHA-1 thumbprint and the public-key
/// digest that becomes a dnQualifier.
#[derive(Debug, Clone)]
pub struct Certificate {
    x509: X509,
}

impl Certificate {
    /// Load a single certificate from a PEM string.
    pub fn from_pem(pem: &str) -> Result<Certificate> {
        let x509 = X509::from_pem(pem.as_bytes())
            .map_err(|e| Error::MiscError(format!("could not decode certificate: {e}")))?;
        Ok(Certificate { x509 })
    }

    pub fn from_x509(x509: X509) -> Certificate {
        Certificate { x509 }
    }

    pub fn x509(&self) -> &X509 {
        &self.x509
    }

    /// The certificate as PEM. With `with_begin_end` false the BEGIN/END markers and line
    /// breaks are stripped, which is the form embedded in `<ds:X509Certificate>` elements.
    pub fn certificate(&self, with_begin_end: bool) -> Result<String> {
        let pem = String::from_utf8(self.x509.to_pem()?)
            .map_err(|_| Error::MiscError("certificate PEM is not UTF-8".to_string()))?;
        if with_begin_end {
            Ok(pem)
        } else {
            Ok(pem
                .lines()
                .filter(|l| !l.starts_with("-----"))
                .collect::<Vec<_>>()
                .concat())
        }
    }

    /// The serial number in decimal.
    pub fn serial(&self) -> Result<String> {
        let bn = self.x509.serial_number().to_bn()?;
        Ok(bn.to_dec_str()?.to_string())
    }

    pub fn issuer(&self) -> Result<String> {
        name_for_xml(self.x509.issuer_name())
    }

    pub fn subject(&self) -> Result<String> {
        name_for_xml(self.x509.subject_name())
    }

    pub fn subject_common_name(&self) -> Result<String> {
        name_part(self.x509.subject_name(), Nid::COMMONNAME)
    }

    pub fn subject_organization_name(&self) -> Result<String> {
        name_part(self.x509.subject_name(), Nid::ORGANIZATIONNAME)
    }

    pub fn subject_organizational_unit_name(&self) -> Result<String> {
        name_part(self.x509.subject_name(), Nid::ORGANIZATIONALUNITNAME)
    }

    pub fn not_before(&self) -> Result<LocalTime> {
        asn1_to_local_time(self.x509.not_before())
    }

    pub fn not_after(&self) -> Result<LocalTime> {
        asn1_to_local_time(self.x509.not_after())
    }

    /// Base64 SHA-1 digest of the certificate, used as a device thumbprint in KDMs.
    pub fn thumbprint(&self) -> Result<String> {
        let digest = self.x509.digest(MessageDigest::sha1())?;
        Ok(BASE64_STANDARD.encode(digest))
    }

    pub fn public_key(&self) -> Result<PKey<Public>> {
        Ok(self.x509.public_key()?)
    }

    /// Base64 SHA-1 of the DER-encoded public key. Certificates issued for digital cinema
    /// carry this value as the dnQualifier attribute of their subject name.
    pub fn public_key_digest(&self) -> Result<String> {
        let der = self.x509.public_key()?.public_key_to_der()?;
        Ok(BASE64_STANDARD.encode(openssl::sha::sha1(&der)))
    }

    /// True if this certificate's issuer and subject names are the same, i.e. it can only be
    /// a root.
    pub fn self_signed(&self) -> Result<bool> {
        Ok(self.issuer()? == self.subject()?)
    }

    /// Check that `issuer`'s public key verifies this certificate's signature.
    pub fn signed_by(&self, issuer: &Certificate) -> Result<bool> {
        Ok(self.x509.verify(issuer.public_key()?.as_ref())?)
    }
}

impl PartialEq for Certificate {
    fn eq(&self, other: &Certificate) -> bool {
        match (self.x509.to_der(), other.x509.to_der()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Certificate {}

/// Serialize an X.509 name the way DCP XML wants it: `dnQualifier=...,CN=...,OU=...,O=...`
/// with `,` and `+` escaped.
fn name_for_xml(name: &X509NameRef) -> Result<String> {
    let mut parts = Vec::new();
    for (nid, label) in [
        (Nid::DNQUALIFIER, "dnQualifier"),
        (Nid::COMMONNAME, "CN"),
        (Nid::ORGANIZATIONALUNITNAME, "OU"),
        (Nid::ORGANIZATIONNAME, "O"),
    ] {
        if let Some(entry) = name.entries_by_nid(nid).next() {
            let value = entry
                .data()
                .as_utf8()
                .map_err(|e| Error::MiscError(format!("bad name entry: {e}")))?;
            let escaped = value.to_string().replace('+', "\\+").replace(',', "\\,");
            parts.push(format!("{label}={escaped}"));
        }
    }
    Ok(parts.join(","))
}

fn name_part(name: &X509NameRef, nid: Nid) -> Result<String> {
    let entry = name
        .entries_by_nid(nid)
        .next()
        .ok_or_else(|| Error::MiscError("missing name entry".to_string()))?;
    Ok(entry
        .data()
        .as_utf8()
        .map_err(|e| Error::MiscError(format!("bad name entry: {e}")))?
        .to_string())
}

fn asn1_to_local_time(time: &Asn1TimeRef) -> Result<LocalTime> {
    let epoch = Asn1Time::from_unix(0)?;
    let diff = epoch.diff(time)?;
    let seconds = diff.days as i64 * 86400 + diff.secs as i64;
    let utc = Utc
        .timestamp_opt(seconds, 0)
        .single()
        .ok_or_else(|| Error::MiscError("certificate time out of range".to_string()))?;
    Ok(LocalTime::from_datetime(
        utc.with_timezone(&FixedOffset::east_opt(0).unwrap()),
    ))
}
