// Certificate chain construction, ordering and validity.

pub mod common;

use common::{make_signing_chain, setup_logging};
use dcp::CertificateChain;

#[test]
fn generated_chain_is_valid() {
    setup_logging();
    let chain = make_signing_chain();
    assert_eq!(chain.unordered().len(), 3);
    assert!(chain.chain_valid().unwrap());
    assert!(chain.private_key_valid().unwrap());

    let ordered = chain.root_to_leaf().unwrap();
    assert_eq!(ordered.len(), 3);
    // root is self-signed, the leaf is not
    assert!(ordered[0].self_signed().unwrap());
    assert!(!ordered[2].self_signed().unwrap());
    // each link is issued by the previous one
    assert_eq!(ordered[1].issuer().unwrap(), ordered[0].subject().unwrap());
    assert_eq!(ordered[2].issuer().unwrap(), ordered[1].subject().unwrap());

    assert_eq!(chain.root().unwrap(), ordered[0]);
    assert_eq!(chain.leaf().unwrap(), ordered[2]);
}

#[test]
fn certificate_names_and_digests() {
    setup_logging();
    let chain = make_signing_chain();
    let leaf = chain.leaf().unwrap();

    let subject = leaf.subject().unwrap();
    assert!(subject.contains("CN=CS.smpte-430-2.LEAF.NOT_FOR_PRODUCTION"));
    assert!(subject.contains("O=example.org"));
    assert!(subject.contains("dnQualifier="));

    // the dnQualifier in the subject is the digest of the leaf's own public key
    let dn_qualifier = leaf.public_key_digest().unwrap();
    assert!(subject.contains(&dn_qualifier.replace('+', "\\+").replace(',', "\\,")));

    // thumbprints are 20 bytes of SHA-1, base64 with padding
    let thumbprint = leaf.thumbprint().unwrap();
    assert_eq!(thumbprint.len(), 28);
    assert!(thumbprint.ends_with('='));

    // a ten-year NOT_FOR_PRODUCTION lifetime
    let not_before = leaf.not_before().unwrap();
    let not_after = leaf.not_after().unwrap();
    assert!(not_before < not_after);
    assert!(not_after.year() - not_before.year() >= 9);
}

#[test]
fn chain_round_trips_through_pem() {
    setup_logging();
    let chain = make_signing_chain();
    let pem = chain.chain().unwrap();

    let mut reread = CertificateChain::from_pem(&pem).unwrap();
    assert_eq!(reread.unordered().len(), 3);
    reread.set_key(chain.key().unwrap());
    assert!(reread.chain_valid().unwrap());
    assert_eq!(reread.leaf().unwrap(), chain.leaf().unwrap());
}

#[test]
fn broken_chains_are_detected() {
    setup_logging();
    // a chain missing its intermediate has a broken link
    let chain = make_signing_chain();
    let ordered = chain.root_to_leaf().unwrap();
    let mut broken = CertificateChain::new();
    broken.add(ordered[0].clone());
    broken.add(ordered[2].clone());
    assert!(broken.root_to_leaf().is_err());
    assert!(!broken.chain_valid().unwrap());

    // two unrelated roots cannot form a chain
    let other = make_signing_chain();
    let mut two_roots = CertificateChain::new();
    two_roots.add(chain.root().unwrap());
    two_roots.add(other.root().unwrap());
    assert!(two_roots.root_to_leaf().is_err());

    // a key that does not match the leaf is rejected
    let mut mismatched = CertificateChain::from_pem(&chain.chain().unwrap()).unwrap();
    mismatched.set_key(other.key().unwrap());
    assert!(!mismatched.private_key_valid().unwrap());
    assert!(!mismatched.chain_valid().unwrap());
}

#[test]
fn leaf_from_wrong_issuer_fails_validity() {
    setup_logging();
    let a = make_signing_chain();
    let b = make_signing_chain();
    // stitch b's leaf onto a's root+intermediate: names do not line up
    let mut franken = CertificateChain::new();
    franken.add(a.root().unwrap());
    franken.add(a.root_to_leaf().unwrap()[1].clone());
    franken.add(b.leaf().unwrap());
    assert!(franken.root_to_leaf().is_err() || !franken.chain_valid().unwrap());
}
