//! Certificate chains: ordering and validity checks, chain generation for signing, and the
//! production and verification of enveloped XML digital signatures.

use base64::prelude::{Engine, BASE64_STANDARD};
use openssl::bn::{BigNum, MsbOption};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::sign::{Signer, Verifier};
use openssl::x509::extension::{BasicConstraints, KeyUsage};
use openssl::x509::{X509Builder, X509Name, X509NameBuilder, X509};
use tracing::debug;

use crate::certificate::Certificate;
use crate::types::Standard;
use crate::xml::Element;
use crate::{Error, Result};

pub const DSIG_NS: &str = "http://www.w3.org/2000/09/xmldsig#";
const ENVELOPED_SIGNATURE: &str = "http://www.w3.org/2000/09/xmldsig#enveloped-signature";
const EXC_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";

/// An unordered set of certificates which should form a chain from a self-signed root down to
/// a leaf, plus (optionally) the leaf's private key in PEM form.
#[derive(Debug, Clone, Default)]
pub struct CertificateChain {
    certificates: Vec<Certificate>,
    key: Option<String>,
}

impl CertificateChain {
    pub fn new() -> CertificateChain {
        CertificateChain::default()
    }

    /// Read a chain from a string containing one or more PEM certificates, in any order.
    pub fn from_pem(pem: &str) -> Result<CertificateChain> {
        let stack = X509::stack_from_pem(pem.as_bytes())
            .map_err(|e| Error::MiscError(format!("could not decode certificates: {e}")))?;
        if stack.is_empty() {
            return Err(Error::MiscError("no certificates found".to_string()));
        }
        Ok(CertificateChain {
            certificates: stack.into_iter().map(Certificate::from_x509).collect(),
            key: None,
        })
    }

    /// Generate a complete chain (self-signed root, intermediate, leaf with private key)
    /// suitable for signing DCPs and KDMs.
    pub fn new_for_signing(
        organisation: &str,
        organisational_unit: &str,
        root_common_name: &str,
        intermediate_common_name: &str,
        leaf_common_name: &str,
    ) -> Result<CertificateChain> {
        let root_key = PKey::from_rsa(Rsa::generate(2048)?)?;
        let intermediate_key = PKey::from_rsa(Rsa::generate(2048)?)?;
        let leaf_key = PKey::from_rsa(Rsa::generate(2048)?)?;

        let root_name = make_name(organisation, organisational_unit, root_common_name, &root_key)?;
        let intermediate_name = make_name(
            organisation,
            organisational_unit,
            intermediate_common_name,
            &intermediate_key,
        )?;
        let leaf_name = make_name(organisation, organisational_unit, leaf_common_name, &leaf_key)?;

        let root = make_certificate(&root_key, &root_name, &root_name, &root_key, true)?;
        let intermediate =
            make_certificate(&intermediate_key, &intermediate_name, &root_name, &root_key, true)?;
        let leaf =
            make_certificate(&leaf_key, &leaf_name, &intermediate_name, &intermediate_key, false)?;

        let key_pem = String::from_utf8(leaf_key.rsa()?.private_key_to_pem()?)
            .map_err(|_| Error::MiscError("key PEM is not UTF-8".to_string()))?;

        Ok(CertificateChain {
            certificates: vec![
                Certificate::from_x509(root),
                Certificate::from_x509(intermediate),
                Certificate::from_x509(leaf),
            ],
            key: Some(key_pem),
        })
    }

    pub fn add(&mut self, certificate: Certificate) {
        self.certificates.push(certificate);
    }

    pub fn remove(&mut self, certificate: &Certificate) {
        self.certificates.retain(|c| c != certificate);
    }

    pub fn unordered(&self) -> &[Certificate] {
        &self.certificates
    }

    /// The leaf certificate's private key, if we have it, as PEM.
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn set_key(&mut self, key_pem: &str) {
        self.key = Some(key_pem.to_string());
    }

    /// The certificates ordered from the self-signed root down to the leaf.
    ///
    /// Fails if there is no root, more than one root, a broken link or a duplicate link.
    pub fn root_to_leaf(&self) -> Result<Vec<Certificate>> {
        let mut roots = Vec::new();
        for c in &self.certificates {
            if c.self_signed()? {
                roots.push(c.clone());
            }
        }
        if roots.is_empty() {
            return Err(Error::CertificateChainError("no self-signed root".to_string()));
        }
        if roots.len() > 1 {
            return Err(Error::CertificateChainError("multiple self-signed roots".to_string()));
        }

        let mut ordered = vec![roots.remove(0)];
        while ordered.len() < self.certificates.len() {
            let parent_subject = ordered.last().unwrap().subject()?;
            let mut next = Vec::new();
            for c in &self.certificates {
                if c.issuer()? == parent_subject && !ordered.contains(c) {
                    next.push(c.clone());
                }
            }
            match next.len() {
                0 => {
                    return Err(Error::CertificateChainError(
                        "broken link in certificate chain".to_string(),
                    ))
                }
                1 => ordered.push(next.remove(0)),
                _ => {
                    return Err(Error::CertificateChainError(
                        "duplicate link in certificate chain".to_string(),
                    ))
                }
            }
        }
        Ok(ordered)
    }

    pub fn leaf_to_root(&self) -> Result<Vec<Certificate>> {
        let mut chain = self.root_to_leaf()?;
        chain.reverse();
        Ok(chain)
    }

    pub fn root(&self) -> Result<Certificate> {
        Ok(self.root_to_leaf()?.first().unwrap().clone())
    }

    pub fn leaf(&self) -> Result<Certificate> {
        Ok(self.root_to_leaf()?.last().unwrap().clone())
    }

    /// The whole chain, root first, as concatenated PEM.
    pub fn chain(&self) -> Result<String> {
        let mut out = String::new();
        for c in self.root_to_leaf()? {
            out.push_str(&c.certificate(true)?);
        }
        Ok(out)
    }

    /// True when every non-root certificate is signed by its stated issuer in the set and
    /// the private key (if present) matches the leaf certificate.
    pub fn chain_valid(&self) -> Result<bool> {
        let ordered = match self.root_to_leaf() {
            Ok(o) => o,
            Err(_) => return Ok(false),
        };
        for pair in ordered.windows(2) {
            if !pair[1].signed_by(&pair[0])? {
                return Ok(false);
            }
        }
        if !ordered.first().unwrap().signed_by(ordered.first().unwrap())? {
            return Ok(false);
        }
        self.private_key_valid()
    }

    /// True when the private key (if any) pairs with the leaf certificate's public key.
    pub fn private_key_valid(&self) -> Result<bool> {
        let key_pem = match &self.key {
            Some(k) => k,
            None => return Ok(true),
        };
        if self.certificates.is_empty() {
            return Ok(true);
        }
        let private = private_key_from_pem(key_pem)?;
        let leaf = self.leaf()?;
        Ok(private.public_key_to_der()? == leaf.public_key()?.public_key_to_der()?)
    }

    pub fn valid(&self) -> Result<bool> {
        self.chain_valid()
    }

    /// Sign `parent` in place, appending `<Signer>` and `<dsig:Signature>` as its last two
    /// children. The digest covers `parent` as it stands when this is called (i.e. the whole
    /// document minus the signature), which is what the enveloped-signature transform means
    /// for a signature that is the final child.
    pub fn sign(&self, parent: &mut Element, standard: Standard) -> Result<()> {
        let leaf = self.leaf()?;

        let signer = parent.add_child("Signer");
        let data = signer.add_child("dsig:X509Data");
        data.declare_namespace(DSIG_NS, "dsig");
        let issuer_serial = data.add_child("dsig:X509IssuerSerial");
        issuer_serial.add_text_child("dsig:X509IssuerName", &leaf.issuer()?);
        issuer_serial.add_text_child("dsig:X509SerialNumber", &leaf.serial()?);
        data.add_text_child("dsig:X509SubjectName", &leaf.subject()?);

        let digest = sha256_b64(parent.serialize().as_bytes());
        debug!("signing <{}> with digest {}", parent.name(), digest);

        let mut signature = Element::new("dsig:Signature");
        signature.declare_namespace(DSIG_NS, "dsig");
        let signed_info = signature.add_child("dsig:SignedInfo");
        signed_info
            .add_child("dsig:CanonicalizationMethod")
            .set_attribute("Algorithm", EXC_C14N);
        let signature_method = signed_info.add_child("dsig:SignatureMethod");
        signature_method.set_attribute(
            "Algorithm",
            match standard {
                Standard::Smpte => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256",
                Standard::Interop => "http://www.w3.org/2000/09/xmldsig#rsa-sha1",
            },
        );
        let reference = signed_info.add_child("dsig:Reference");
        reference.set_attribute("URI", "");
        let transforms = reference.add_child("dsig:Transforms");
        transforms
            .add_child("dsig:Transform")
            .set_attribute("Algorithm", ENVELOPED_SIGNATURE);
        transforms
            .add_child("dsig:Transform")
            .set_attribute("Algorithm", EXC_C14N);
        reference
            .add_child("dsig:DigestMethod")
            .set_attribute("Algorithm", "http://www.w3.org/2001/04/xmlenc#sha256");
        reference.add_text_child("dsig:DigestValue", &digest);

        let signature_value = {
            let si = signature.child("SignedInfo").unwrap();
            self.sign_bytes(canonical_signed_info(si).as_bytes())?
        };
        signature.add_text_child("dsig:SignatureValue", &BASE64_STANDARD.encode(signature_value));

        let key_info = signature.add_child("dsig:KeyInfo");
        for certificate in self.leaf_to_root()? {
            let data = key_info.add_child("dsig:X509Data");
            let issuer_serial = data.add_child("dsig:X509IssuerSerial");
            issuer_serial.add_text_child("dsig:X509IssuerName", &certificate.issuer()?);
            issuer_serial.add_text_child("dsig:X509SerialNumber", &certificate.serial()?);
            data.add_text_child("dsig:X509Certificate", &certificate.certificate(false)?);
        }

        parent.add_element(signature);
        Ok(())
    }

    /// RSA-SHA256 sign raw bytes with the leaf private key.
    pub fn sign_bytes(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        let key_pem = self
            .key
            .as_ref()
            .ok_or_else(|| Error::CertificateChainError("no private key in chain".to_string()))?;
        let pkey = private_key_from_pem(key_pem)?;
        let mut signer = Signer::new(MessageDigest::sha256(), &pkey)?;
        Ok(signer.sign_oneshot_to_vec(bytes)?)
    }
}

/// Check the enveloped signature on `root`, using the certificate chain embedded in the
/// signature's `KeyInfo`. Returns true when both the reference digest and the signature
/// value check out.
pub fn verify_signature(root: &Element) -> Result<bool> {
    let mut without_signature = root.clone();
    let signature = match without_signature.take_child("Signature") {
        Some(s) => s,
        None => return Err(Error::MiscError("document has no signature".to_string())),
    };

    let signed_info = signature
        .child("SignedInfo")
        .ok_or_else(|| Error::XMLError("signature has no SignedInfo".to_string()))?;
    let reference = signed_info
        .child("Reference")
        .ok_or_else(|| Error::XMLError("signature has no Reference".to_string()))?;
    let stated_digest = reference.string_child("DigestValue")?;
    let actual_digest = sha256_b64(without_signature.serialize().as_bytes());
    if stated_digest != actual_digest {
        debug!("digest mismatch: stated {} actual {}", stated_digest, actual_digest);
        return Ok(false);
    }

    let key_info = signature
        .child("KeyInfo")
        .ok_or_else(|| Error::XMLError("signature has no KeyInfo".to_string()))?;
    let first_cert_b64 = key_info
        .child_elements()
        .find_map(|d| d.optional_string_child("X509Certificate"))
        .ok_or_else(|| Error::XMLError("signature has no X509Certificate".to_string()))?;
    let der = BASE64_STANDARD
        .decode(first_cert_b64.replace(['\n', '\r', ' '], ""))
        .map_err(|_| Error::XMLError("bad base64 in X509Certificate".to_string()))?;
    let leaf = X509::from_der(&der)
        .map_err(|e| Error::MiscError(format!("bad certificate in signature: {e}")))?;

    let signature_value = BASE64_STANDARD
        .decode(signature.string_child("SignatureValue")?.replace(['\n', '\r', ' '], ""))
        .map_err(|_| Error::XMLError("bad base64 in SignatureValue".to_string()))?;

    let pkey = leaf
        .public_key()
        .map_err(|e| Error::MiscError(format!("bad public key in signature: {e}")))?;
    let mut verifier = Verifier::new(MessageDigest::sha256(), &pkey)?;
    Ok(verifier.verify_oneshot(&signature_value, canonical_signed_info(signed_info).as_bytes())?)
}

/// The byte form of a `SignedInfo` element that is actually signed: the subtree serialized
/// with the dsig namespace declaration hoisted onto it, which both the signing and the
/// verifying side reconstruct identically.
pub fn canonical_signed_info(signed_info: &Element) -> String {
    let mut si = signed_info.clone();
    let mut attrs: Vec<(String, String)> = vec![("xmlns:dsig".to_string(), DSIG_NS.to_string())];
    for (k, v) in si.attributes() {
        if k != "xmlns:dsig" {
            attrs.push((k.to_string(), v.to_string()));
        }
    }
    si.replace_attributes(attrs);
    si.serialize()
}

fn sha256_b64(bytes: &[u8]) -> String {
    BASE64_STANDARD.encode(openssl::sha::sha256(bytes))
}

fn private_key_from_pem(pem: &str) -> Result<PKey<Private>> {
    PKey::private_key_from_pem(pem.as_bytes())
        .map_err(|e| Error::MiscError(format!("could not decode private key: {e}")))
}

fn make_name(
    organisation: &str,
    organisational_unit: &str,
    common_name: &str,
    key: &PKey<Private>,
) -> Result<X509Name> {
    let dn_qualifier = BASE64_STANDARD.encode(openssl::sha::sha1(&key.public_key_to_der()?));
    let mut builder = X509NameBuilder::new()?;
    builder.append_entry_by_nid(Nid::ORGANIZATIONNAME, organisation)?;
    builder.append_entry_by_nid(Nid::ORGANIZATIONALUNITNAME, organisational_unit)?;
    builder.append_entry_by_nid(Nid::COMMONNAME, common_name)?;
    builder.append_entry_by_nid(Nid::DNQUALIFIER, &dn_qualifier)?;
    Ok(builder.build())
}

fn make_certificate(
    public_key: &PKey<Private>,
    subject: &X509Name,
    issuer: &X509Name,
    signing_key: &PKey<Private>,
    ca: bool,
) -> Result<X509> {
    let mut builder = X509Builder::new()?;
    builder.set_version(2)?;

    let mut serial_bn = BigNum::new()?;
    serial_bn.rand(64, MsbOption::MAYBE_ZERO, false)?;
    builder.set_serial_number(serial_bn.to_asn1_integer()?.as_ref())?;

    builder.set_not_before(openssl::asn1::Asn1Time::days_from_now(0)?.as_ref())?;
    builder.set_not_after(openssl::asn1::Asn1Time::days_from_now(10 * 365)?.as_ref())?;
    builder.set_subject_name(subject)?;
    builder.set_issuer_name(issuer)?;
    builder.set_pubkey(public_key)?;

    if ca {
        builder.append_extension(BasicConstraints::new().critical().ca().build()?)?;
        builder.append_extension(KeyUsage::new().key_cert_sign().crl_sign().build()?)?;
    } else {
        builder.append_extension(BasicConstraints::new().critical().build()?)?;
        builder.append_extension(
            KeyUsage::new().digital_signature().key_encipherment().build()?,
        )?;
    }

    builder.sign(signing_key, MessageDigest::sha256())?;
    Ok(builder.build())
}
