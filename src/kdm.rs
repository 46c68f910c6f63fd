//! Key Delivery Messages: the signed XML envelope that carries RSA-wrapped content keys to a
//! particular projector or media block.

use base64::prelude::{Engine, BASE64_STANDARD};
use openssl::hash::MessageDigest;
use openssl::pkey::PKey;
use openssl::rsa::Padding;
use tracing::debug;

use crate::certificate::Certificate;
use crate::certificate_chain::{canonical_signed_info, CertificateChain, DSIG_NS};
use crate::cpl::Cpl;
use crate::dcp_time::LocalTime;
use crate::key::Key;
use crate::types::{Formulation, Standard};
use crate::util::{make_uuid, remove_urn_uuid, uuid_from_bytes, uuid_to_bytes};
use crate::xml::{Document, Element};
use crate::{Error, Result};

const ETM_NS: &str = "http://www.smpte-ra.org/schemas/430-3/2006/ETM";
const KDM_NS: &str = "http://www.smpte-ra.org/schemas/430-1/2006/KDM";
const ENC_NS: &str = "http://www.w3.org/2001/04/xmlenc#";
const KEY_TYPE_SCOPE: &str = "http://www.smpte-ra.org/430-1/2006/KDM#kdm-key-type";
const FORENSIC_PREFIX: &str = "http://www.smpte-ra.org/430-1/2006/KDM#";

/// Identifies the fixed layout of the RSA-encrypted plaintext block.
const STRUCTURE_ID: [u8; 16] = [
    0xf1, 0xdc, 0x12, 0x44, 0x60, 0x16, 0x9a, 0x0e, 0x85, 0xbc, 0x85, 0x11, 0x4d, 0x57, 0x04,
    0x37,
];

/// base64(SHA-1("")), the placeholder thumbprint that grants any device in the
/// modified-transitional formulations.
const ASSUME_TRUST_THUMBPRINT: &str = "2jmj7l5rSw0yVb/vlWAYkK/YBwk=";

/// One decrypted (or to-be-encrypted) content key with its binding.
#[derive(Debug, Clone)]
pub struct DecryptedKdmKey {
    kdm_type: Option<String>,
    id: String,
    key: Key,
    cpl_id: String,
    standard: Standard,
}

impl DecryptedKdmKey {
    pub fn new(
        kdm_type: Option<&str>,
        id: &str,
        key: Key,
        cpl_id: &str,
        standard: Standard,
    ) -> DecryptedKdmKey {
        DecryptedKdmKey {
            kdm_type: kdm_type.map(|t| t.to_string()),
            id: id.to_string(),
            key,
            cpl_id: cpl_id.to_string(),
            standard,
        }
    }

    /// `MDIK`, `MDAK`, `MDSK`, `MDEK` or absent for old Interop KDMs.
    pub fn kdm_type(&self) -> Option<&str> {
        self.kdm_type.as_deref()
    }

    /// The key id, matching a `<KeyId>` in some CPL.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn cpl_id(&self) -> &str {
        &self.cpl_id
    }

    pub fn standard(&self) -> Standard {
        self.standard
    }
}

/// A KDM in the clear: either built locally ready for encryption, or the result of
/// decrypting an [`EncryptedKdm`] with the target's private key.
#[derive(Debug, Clone)]
pub struct DecryptedKdm {
    not_valid_before: LocalTime,
    not_valid_after: LocalTime,
    annotation_text: Option<String>,
    content_title_text: String,
    issue_date: String,
    keys: Vec<DecryptedKdmKey>,
}

impl DecryptedKdm {
    /// An empty KDM; add keys with [`add_key`](Self::add_key).
    pub fn new(
        not_valid_before: LocalTime,
        not_valid_after: LocalTime,
        annotation_text: &str,
        content_title_text: &str,
        issue_date: &str,
    ) -> DecryptedKdm {
        DecryptedKdm {
            not_valid_before,
            not_valid_after,
            annotation_text: Some(annotation_text.to_string()),
            content_title_text: content_title_text.to_string(),
            issue_date: issue_date.to_string(),
            keys: Vec::new(),
        }
    }

    /// Set up a KDM for `cpl`, giving every encrypted asset the same content key.
    pub fn from_cpl(
        cpl: &Cpl,
        key: Key,
        not_valid_before: LocalTime,
        not_valid_after: LocalTime,
        annotation_text: &str,
        content_title_text: &str,
        issue_date: &str,
    ) -> DecryptedKdm {
        let mut kdm = DecryptedKdm::new(
            not_valid_before,
            not_valid_after,
            annotation_text,
            content_title_text,
            issue_date,
        );
        for reel in cpl.reels() {
            if let Some(p) = reel.main_picture() {
                if let Some(key_id) = p.core.key_id() {
                    kdm.add_key(DecryptedKdmKey::new(
                        Some("MDIK"),
                        key_id,
                        key,
                        cpl.id(),
                        cpl.standard(),
                    ));
                }
            }
            if let Some(s) = reel.main_sound() {
                if let Some(key_id) = s.core.key_id() {
                    kdm.add_key(DecryptedKdmKey::new(
                        Some("MDAK"),
                        key_id,
                        key,
                        cpl.id(),
                        cpl.standard(),
                    ));
                }
            }
            if let Some(s) = reel.main_subtitle() {
                if let Some(key_id) = s.core.key_id() {
                    kdm.add_key(DecryptedKdmKey::new(
                        Some("MDSK"),
                        key_id,
                        key,
                        cpl.id(),
                        cpl.standard(),
                    ));
                }
            }
            for cc in reel.closed_captions() {
                if let Some(key_id) = cc.core.key_id() {
                    kdm.add_key(DecryptedKdmKey::new(
                        Some("MDSK"),
                        key_id,
                        key,
                        cpl.id(),
                        cpl.standard(),
                    ));
                }
            }
            if let Some(a) = reel.atmos() {
                if let Some(key_id) = a.core.key_id() {
                    kdm.add_key(DecryptedKdmKey::new(
                        Some("MDEK"),
                        key_id,
                        key,
                        cpl.id(),
                        cpl.standard(),
                    ));
                }
            }
        }
        kdm
    }

    /// Decrypt an encrypted KDM with a PEM private key.
    ///
    /// Blocks that decrypt but carry an unknown structure id are skipped; an RSA failure is
    /// an error. The KDM's signature is not checked here — the verifier flags unsigned KDMs,
    /// but decryption only needs the private key.
    pub fn from_encrypted(kdm: &EncryptedKdm, private_key_pem: &str) -> Result<DecryptedKdm> {
        let pkey = PKey::private_key_from_pem(private_key_pem.as_bytes())
            .map_err(|e| Error::KDMDecryptionError(format!("bad private key: {e}")))?;
        let rsa = pkey
            .rsa()
            .map_err(|e| Error::KDMDecryptionError(format!("not an RSA key: {e}")))?;

        let mut keys = Vec::new();
        for cipher_b64 in kdm.encrypted_keys() {
            let cipher = BASE64_STANDARD
                .decode(cipher_b64.replace(['\n', '\r', ' '], ""))
                .map_err(|_| Error::KDMDecryptionError("bad base64 cipher block".to_string()))?;
            let mut plain = vec![0u8; rsa.size() as usize];
            let n = rsa
                .private_decrypt(&cipher, &mut plain, Padding::PKCS1_OAEP)
                .map_err(|e| Error::KDMDecryptionError(format!("RSA decrypt failed: {e}")))?;
            plain.truncate(n);
            if plain.len() != 138 {
                return Err(Error::KDMDecryptionError(format!(
                    "unexpected plaintext block length {}",
                    plain.len()
                )));
            }
            if plain[0..16] != STRUCTURE_ID {
                debug!("skipping key block with unknown structure id");
                continue;
            }
            // bytes 16..36 are the signer thumbprint, which we do not need to recover keys
            let cpl_id = uuid_from_bytes(plain[36..52].try_into().unwrap());
            let kdm_type = String::from_utf8_lossy(&plain[52..56]).to_string();
            let key_id = uuid_from_bytes(plain[56..72].try_into().unwrap());
            let not_before = String::from_utf8_lossy(&plain[72..97]).to_string();
            let not_after = String::from_utf8_lossy(&plain[97..122]).to_string();
            let key = Key::from_bytes(plain[122..138].try_into().unwrap());
            debug!("recovered key {key_id} for CPL {cpl_id} ({not_before} to {not_after})");
            keys.push(DecryptedKdmKey::new(
                Some(kdm_type.as_str()),
                &key_id,
                key,
                &cpl_id,
                Standard::Smpte,
            ));
        }

        Ok(DecryptedKdm {
            not_valid_before: LocalTime::from_string(kdm.not_valid_before())?,
            not_valid_after: LocalTime::from_string(kdm.not_valid_after())?,
            annotation_text: kdm.annotation_text().map(|a| a.to_string()),
            content_title_text: kdm.content_title_text().to_string(),
            issue_date: kdm.issue_date().to_string(),
            keys,
        })
    }

    pub fn add_key(&mut self, key: DecryptedKdmKey) {
        self.keys.push(key);
    }

    pub fn keys(&self) -> &[DecryptedKdmKey] {
        &self.keys
    }

    pub fn annotation_text(&self) -> Option<&str> {
        self.annotation_text.as_deref()
    }

    pub fn content_title_text(&self) -> &str {
        &self.content_title_text
    }

    pub fn issue_date(&self) -> &str {
        &self.issue_date
    }

    pub fn not_valid_before(&self) -> LocalTime {
        self.not_valid_before
    }

    pub fn not_valid_after(&self) -> LocalTime {
        self.not_valid_after
    }

    /// Encrypt each key to `recipient` and sign the envelope with `signer`.
    ///
    /// `disable_forensic_marking_audio`: `None` leaves audio marking on, `Some(0)` disables
    /// it entirely, `Some(n)` disables it above channel `n`.
    pub fn encrypt(
        &self,
        signer: &CertificateChain,
        recipient: &Certificate,
        trusted_devices: &[String],
        formulation: Formulation,
        disable_forensic_marking_picture: bool,
        disable_forensic_marking_audio: Option<u32>,
    ) -> Result<EncryptedKdm> {
        let leaf = signer.leaf()?;
        let cert_not_before = leaf.not_before()?;
        let cert_not_after = leaf.not_after()?;
        if self.not_valid_before < cert_not_before || self.not_valid_after > cert_not_after {
            return Err(Error::BadKDMDateError(format!(
                "{} to {}",
                self.not_valid_before, self.not_valid_after
            )));
        }

        let cpl_id = self
            .keys
            .first()
            .map(|k| k.cpl_id().to_string())
            .ok_or_else(|| Error::MiscError("KDM has no keys".to_string()))?;

        // the wrapped block binds the key to the CPL, the validity window and the signer
        let leaf_thumbprint_raw = openssl::sha::sha1(&leaf.x509().to_der()?);
        let recipient_rsa = recipient
            .public_key()?
            .rsa()
            .map_err(|e| Error::MiscError(format!("recipient key is not RSA: {e}")))?;

        let mut encrypted_keys = Vec::new();
        for key in &self.keys {
            let mut block = Vec::with_capacity(138);
            block.extend_from_slice(&STRUCTURE_ID);
            block.extend_from_slice(&leaf_thumbprint_raw);
            block.extend_from_slice(&uuid_to_bytes(key.cpl_id())?);
            block.extend_from_slice(key.kdm_type().unwrap_or("MDIK").as_bytes());
            block.extend_from_slice(&uuid_to_bytes(key.id())?);
            block.extend_from_slice(self.not_valid_before.as_string().as_bytes());
            block.extend_from_slice(self.not_valid_after.as_string().as_bytes());
            block.extend_from_slice(key.key().as_bytes());
            debug_assert_eq!(block.len(), 138);

            let mut cipher = vec![0u8; recipient_rsa.size() as usize];
            let n = recipient_rsa
                .public_encrypt(&block, &mut cipher, Padding::PKCS1_OAEP)
                .map_err(|e| Error::MiscError(format!("RSA encrypt failed: {e}")))?;
            cipher.truncate(n);
            encrypted_keys.push(BASE64_STANDARD.encode(cipher));
        }

        let mut forensic_mark_flags = Vec::new();
        if disable_forensic_marking_picture {
            forensic_mark_flags.push(format!("{FORENSIC_PREFIX}mrkflg-picture-disable"));
        }
        match disable_forensic_marking_audio {
            Some(0) => forensic_mark_flags.push(format!("{FORENSIC_PREFIX}mrkflg-audio-disable")),
            Some(channel) => forensic_mark_flags.push(format!(
                "{FORENSIC_PREFIX}mrkflg-audio-disable-above-channel-{channel}"
            )),
            None => {}
        }

        let mut devices = match formulation {
            Formulation::ModifiedTransitional1 | Formulation::MultipleModifiedTransitional1 => {
                vec![ASSUME_TRUST_THUMBPRINT.to_string()]
            }
            Formulation::DciAny | Formulation::DciSpecific => vec![recipient.thumbprint()?],
        };
        devices.extend(trusted_devices.iter().cloned());

        let mut kdm = EncryptedKdm {
            message_id: make_uuid(),
            annotation_text: self.annotation_text.clone(),
            issue_date: self.issue_date.clone(),
            signer_issuer: leaf.issuer()?,
            signer_serial: leaf.serial()?,
            recipient_issuer: recipient.issuer()?,
            recipient_serial: recipient.serial()?,
            recipient_subject: recipient.subject()?,
            cpl_id,
            content_title_text: self.content_title_text.clone(),
            not_valid_before: self.not_valid_before.as_string(),
            not_valid_after: self.not_valid_after.as_string(),
            device_list_identifier: make_uuid(),
            device_list_description: Some("Modified Transitional 1".to_string()),
            trusted_devices: devices,
            typed_key_ids: self
                .keys
                .iter()
                .map(|k| (k.kdm_type().map(|t| t.to_string()), k.id().to_string()))
                .collect(),
            forensic_mark_flags,
            encrypted_keys,
            signature: None,
        };
        kdm.sign(signer)?;
        Ok(kdm)
    }
}

/// A fully-formed, signed KDM envelope.
#[derive(Debug, Clone)]
pub struct EncryptedKdm {
    message_id: String,
    annotation_text: Option<String>,
    issue_date: String,
    signer_issuer: String,
    signer_serial: String,
    recipient_issuer: String,
    recipient_serial: String,
    recipient_subject: String,
    cpl_id: String,
    content_title_text: String,
    not_valid_before: String,
    not_valid_after: String,
    device_list_identifier: String,
    device_list_description: Option<String>,
    trusted_devices: Vec<String>,
    typed_key_ids: Vec<(Option<String>, String)>,
    forensic_mark_flags: Vec<String>,
    encrypted_keys: Vec<String>,
    /// The verbatim `<dsig:Signature>` subtree; kept as parsed so that re-serialization is
    /// byte-identical.
    signature: Option<Element>,
}

impl EncryptedKdm {
    /// Parse a KDM from its XML text.
    pub fn from_xml(xml: &str) -> Result<EncryptedKdm> {
        let doc = Document::read_string(xml)?;
        let root = doc.root();
        if root.name() != "DCinemaSecurityMessage" {
            return Err(Error::XMLError(format!(
                "root is <{}>, expecting <DCinemaSecurityMessage>",
                root.name()
            )));
        }
        let public = root
            .child("AuthenticatedPublic")
            .ok_or_else(|| Error::XMLError("KDM has no AuthenticatedPublic".to_string()))?;
        let signer = public
            .child("Signer")
            .ok_or_else(|| Error::XMLError("KDM has no Signer".to_string()))?;
        let extensions = public
            .child("RequiredExtensions")
            .and_then(|r| r.child("KDMRequiredExtensions"))
            .ok_or_else(|| Error::XMLError("KDM has no KDMRequiredExtensions".to_string()))?;
        let recipient = extensions
            .child("Recipient")
            .ok_or_else(|| Error::XMLError("KDM has no Recipient".to_string()))?;
        let recipient_serial_node = recipient
            .child("X509IssuerSerial")
            .ok_or_else(|| Error::XMLError("KDM Recipient has no X509IssuerSerial".to_string()))?;

        let mut typed_key_ids = Vec::new();
        if let Some(list) = extensions.child("KeyIdList") {
            for typed in list.children_named("TypedKeyId") {
                typed_key_ids.push((
                    typed.optional_string_child("KeyType"),
                    remove_urn_uuid(&typed.string_child("KeyId")?),
                ));
            }
        }

        let mut forensic_mark_flags = Vec::new();
        if let Some(list) = extensions.child("ForensicMarkFlagList") {
            for flag in list.children_named("ForensicMarkFlag") {
                forensic_mark_flags.push(flag.text());
            }
        }

        let (device_list_identifier, device_list_description, trusted_devices) =
            match extensions.child("AuthorizedDeviceInfo") {
                Some(info) => {
                    let mut devices = Vec::new();
                    if let Some(list) = info.child("DeviceList") {
                        for t in list.children_named("CertificateThumbprint") {
                            devices.push(t.text());
                        }
                    }
                    (
                        remove_urn_uuid(&info.string_child("DeviceListIdentifier")?),
                        info.optional_string_child("DeviceListDescription"),
                        devices,
                    )
                }
                None => (make_uuid(), None, Vec::new()),
            };

        let private = root
            .child("AuthenticatedPrivate")
            .ok_or_else(|| Error::XMLError("KDM has no AuthenticatedPrivate".to_string()))?;
        let mut encrypted_keys = Vec::new();
        for key in private.children_named("EncryptedKey") {
            let cipher = key
                .child("CipherData")
                .and_then(|c| c.child("CipherValue"))
                .map(|v| v.text())
                .ok_or_else(|| Error::XMLError("EncryptedKey has no CipherValue".to_string()))?;
            encrypted_keys.push(cipher);
        }

        Ok(EncryptedKdm {
            message_id: remove_urn_uuid(&public.string_child("MessageId")?),
            annotation_text: public.optional_string_child("AnnotationText"),
            issue_date: public.string_child("IssueDate")?,
            signer_issuer: signer.string_child("X509IssuerName")?,
            signer_serial: signer.string_child("X509SerialNumber")?,
            recipient_issuer: recipient_serial_node.string_child("X509IssuerName")?,
            recipient_serial: recipient_serial_node.string_child("X509SerialNumber")?,
            recipient_subject: recipient.string_child("X509SubjectName")?,
            cpl_id: remove_urn_uuid(&extensions.string_child("CompositionPlaylistId")?),
            content_title_text: extensions.string_child("ContentTitleText")?,
            not_valid_before: extensions.string_child("ContentKeysNotValidBefore")?,
            not_valid_after: extensions.string_child("ContentKeysNotValidAfter")?,
            device_list_identifier,
            device_list_description,
            trusted_devices,
            typed_key_ids,
            forensic_mark_flags,
            encrypted_keys,
            signature: root.child("Signature").cloned(),
        })
    }

    /// Read a KDM from a file.
    pub fn from_file(path: &std::path::Path) -> Result<EncryptedKdm> {
        let xml =
            std::fs::read_to_string(path).map_err(|e| Error::FileError(e, path.to_path_buf()))?;
        EncryptedKdm::from_xml(&xml)
    }

    fn authenticated_public(&self) -> Element {
        let mut public = Element::new("AuthenticatedPublic");
        public.set_attribute("Id", "ID_AuthenticatedPublic");
        public.add_text_child("MessageId", &format!("urn:uuid:{}", self.message_id));
        public.add_text_child("MessageType", "http://www.smpte-ra.org/430-1/2006/KDM#kdm-key-type");
        if let Some(a) = &self.annotation_text {
            public.add_text_child("AnnotationText", a);
        }
        public.add_text_child("IssueDate", &self.issue_date);
        let signer = public.add_child("Signer");
        signer.add_text_child("dsig:X509IssuerName", &self.signer_issuer);
        signer.add_text_child("dsig:X509SerialNumber", &self.signer_serial);

        let required = public.add_child("RequiredExtensions");
        let extensions = required.add_child("KDMRequiredExtensions");
        extensions.declare_namespace(KDM_NS, "");
        let recipient = extensions.add_child("Recipient");
        let issuer_serial = recipient.add_child("X509IssuerSerial");
        issuer_serial.add_text_child("dsig:X509IssuerName", &self.recipient_issuer);
        issuer_serial.add_text_child("dsig:X509SerialNumber", &self.recipient_serial);
        recipient.add_text_child("X509SubjectName", &self.recipient_subject);
        extensions.add_text_child("CompositionPlaylistId", &format!("urn:uuid:{}", self.cpl_id));
        extensions.add_text_child("ContentTitleText", &self.content_title_text);
        extensions.add_text_child("ContentKeysNotValidBefore", &self.not_valid_before);
        extensions.add_text_child("ContentKeysNotValidAfter", &self.not_valid_after);
        let device_info = extensions.add_child("AuthorizedDeviceInfo");
        device_info.add_text_child(
            "DeviceListIdentifier",
            &format!("urn:uuid:{}", self.device_list_identifier),
        );
        if let Some(d) = &self.device_list_description {
            device_info.add_text_child("DeviceListDescription", d);
        }
        let device_list = device_info.add_child("DeviceList");
        for thumbprint in &self.trusted_devices {
            device_list.add_text_child("CertificateThumbprint", thumbprint);
        }
        let key_id_list = extensions.add_child("KeyIdList");
        for (kdm_type, key_id) in &self.typed_key_ids {
            let typed = key_id_list.add_child("TypedKeyId");
            if let Some(t) = kdm_type {
                let kt = typed.add_text_child("KeyType", t);
                kt.set_attribute("scope", KEY_TYPE_SCOPE);
            }
            typed.add_text_child("KeyId", &format!("urn:uuid:{key_id}"));
        }
        if !self.forensic_mark_flags.is_empty() {
            let list = extensions.add_child("ForensicMarkFlagList");
            for flag in &self.forensic_mark_flags {
                list.add_text_child("ForensicMarkFlag", flag);
            }
        }
        public.add_child("NonCriticalExtensions");
        public
    }

    fn authenticated_private(&self) -> Element {
        let mut private = Element::new("AuthenticatedPrivate");
        private.set_attribute("Id", "ID_AuthenticatedPrivate");
        for cipher in &self.encrypted_keys {
            let key = private.add_child("enc:EncryptedKey");
            key.declare_namespace(ENC_NS, "enc");
            let method = key.add_child("enc:EncryptionMethod");
            method.set_attribute("Algorithm", "http://www.w3.org/2001/04/xmlenc#rsa-oaep-mgf1p");
            let digest = method.add_child("ds:DigestMethod");
            digest.declare_namespace(DSIG_NS, "ds");
            digest.set_attribute("Algorithm", "http://www.w3.org/2000/09/xmldsig#sha1");
            key.add_child("enc:CipherData")
                .add_text_child("enc:CipherValue", cipher);
        }
        private
    }

    fn sign(&mut self, signer: &CertificateChain) -> Result<()> {
        let public_digest =
            BASE64_STANDARD.encode(openssl::sha::sha256(self.authenticated_public().serialize().as_bytes()));
        let private_digest =
            BASE64_STANDARD.encode(openssl::sha::sha256(self.authenticated_private().serialize().as_bytes()));

        let mut signature = Element::new("dsig:Signature");
        signature.declare_namespace(DSIG_NS, "dsig");
        let signed_info = signature.add_child("dsig:SignedInfo");
        signed_info
            .add_child("dsig:CanonicalizationMethod")
            .set_attribute("Algorithm", "http://www.w3.org/2001/10/xml-exc-c14n#");
        signed_info
            .add_child("dsig:SignatureMethod")
            .set_attribute("Algorithm", "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256");
        for (uri, digest) in [
            ("#ID_AuthenticatedPublic", &public_digest),
            ("#ID_AuthenticatedPrivate", &private_digest),
        ] {
            let reference = signed_info.add_child("dsig:Reference");
            reference.set_attribute("URI", uri);
            reference
                .add_child("dsig:DigestMethod")
                .set_attribute("Algorithm", "http://www.w3.org/2001/04/xmlenc#sha256");
            reference.add_text_child("dsig:DigestValue", digest);
        }

        let signature_value = {
            let si = signature.child("SignedInfo").unwrap();
            signer.sign_bytes(canonical_signed_info(si).as_bytes())?
        };
        signature.add_text_child("dsig:SignatureValue", &BASE64_STANDARD.encode(signature_value));

        let key_info = signature.add_child("dsig:KeyInfo");
        for certificate in signer.leaf_to_root()? {
            let data = key_info.add_child("dsig:X509Data");
            let issuer_serial = data.add_child("dsig:X509IssuerSerial");
            issuer_serial.add_text_child("dsig:X509IssuerName", &certificate.issuer()?);
            issuer_serial.add_text_child("dsig:X509SerialNumber", &certificate.serial()?);
            data.add_text_child("dsig:X509Certificate", &certificate.certificate(false)?);
        }
        self.signature = Some(signature);
        Ok(())
    }

    /// Serialize the whole envelope; the output of a parse/serialize round trip is
    /// byte-identical for documents this library produced.
    pub fn as_xml(&self) -> String {
        let mut root = Element::with_namespace("DCinemaSecurityMessage", ETM_NS);
        root.declare_namespace(DSIG_NS, "dsig");
        root.add_element(self.authenticated_public());
        root.add_element(self.authenticated_private());
        if let Some(signature) = &self.signature {
            root.add_element(signature.clone());
        }
        Document::new(root).serialize()
    }

    /// Check both authenticated-section digests and the RSA signature value against the leaf
    /// certificate embedded in `KeyInfo`.
    pub fn signature_valid(&self) -> Result<bool> {
        let signature = match &self.signature {
            Some(s) => s,
            None => return Ok(false),
        };
        let signed_info = signature
            .child("SignedInfo")
            .ok_or_else(|| Error::XMLError("signature has no SignedInfo".to_string()))?;
        for reference in signed_info.children_named("Reference") {
            let stated = reference.string_child("DigestValue")?;
            let actual = match reference.attribute("URI") {
                Some("#ID_AuthenticatedPublic") => BASE64_STANDARD
                    .encode(openssl::sha::sha256(self.authenticated_public().serialize().as_bytes())),
                Some("#ID_AuthenticatedPrivate") => BASE64_STANDARD
                    .encode(openssl::sha::sha256(self.authenticated_private().serialize().as_bytes())),
                _ => continue,
            };
            if stated != actual {
                return Ok(false);
            }
        }

        let key_info = signature
            .child("KeyInfo")
            .ok_or_else(|| Error::XMLError("signature has no KeyInfo".to_string()))?;
        let first_cert = key_info
            .child_elements()
            .find_map(|d| d.optional_string_child("X509Certificate"))
            .ok_or_else(|| Error::XMLError("signature has no X509Certificate".to_string()))?;
        let der = BASE64_STANDARD
            .decode(first_cert.replace(['\n', '\r', ' '], ""))
            .map_err(|_| Error::XMLError("bad base64 certificate".to_string()))?;
        let leaf = openssl::x509::X509::from_der(&der)
            .map_err(|e| Error::MiscError(format!("bad certificate in signature: {e}")))?;
        let signature_value = BASE64_STANDARD
            .decode(signature.string_child("SignatureValue")?.replace(['\n', '\r', ' '], ""))
            .map_err(|_| Error::XMLError("bad base64 SignatureValue".to_string()))?;
        let pkey = leaf.public_key()?;
        let mut verifier = openssl::sign::Verifier::new(MessageDigest::sha256(), &pkey)?;
        Ok(verifier.verify_oneshot(&signature_value, canonical_signed_info(signed_info).as_bytes())?)
    }

    pub fn signed(&self) -> bool {
        self.signature.is_some()
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn annotation_text(&self) -> Option<&str> {
        self.annotation_text.as_deref()
    }

    pub fn issue_date(&self) -> &str {
        &self.issue_date
    }

    pub fn cpl_id(&self) -> &str {
        &self.cpl_id
    }

    pub fn content_title_text(&self) -> &str {
        &self.content_title_text
    }

    pub fn not_valid_before(&self) -> &str {
        &self.not_valid_before
    }

    pub fn not_valid_after(&self) -> &str {
        &self.not_valid_after
    }

    pub fn recipient_subject(&self) -> &str {
        &self.recipient_subject
    }

    pub fn typed_key_ids(&self) -> &[(Option<String>, String)] {
        &self.typed_key_ids
    }

    pub fn forensic_mark_flags(&self) -> &[String] {
        &self.forensic_mark_flags
    }

    pub fn trusted_devices(&self) -> &[String] {
        &self.trusted_devices
    }

    pub fn encrypted_keys(&self) -> &[String] {
        &self.encrypted_keys
    }

    pub fn write_xml(&self, path: &std::path::Path) -> Result<()> {
        std::fs::write(path, self.as_xml()).map_err(|e| Error::FileError(e, path.to_path_buf()))
    }
}
