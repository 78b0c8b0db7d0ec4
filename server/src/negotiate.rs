//! Turns an MTA's offered [`OptNeg`] and an application's [`AppDecl`] into
//! the flags actually in effect for a session.

use oxmilter_common::{
    optneg::{CompatibilityError, OptNeg, Protocol},
    ProtocolError,
};

use crate::hooks::{AppDecl, HookFlags};

/// The protocol version this implementation speaks. Offers below this are
/// rejected outright.
const SUPPORTED_VERSION: u32 = 6;

const SKIP_TABLE: &[(HookFlags, Protocol)] = &[
    (HookFlags::CONNECT, Protocol::NO_CONNECT),
    (HookFlags::HELO, Protocol::NO_HELO),
    (HookFlags::MAIL, Protocol::NO_MAIL),
    (HookFlags::RCPT, Protocol::NO_RECIPIENT),
    (HookFlags::DATA, Protocol::NO_DATA),
    (HookFlags::HEADER, Protocol::NO_HEADER),
    (HookFlags::END_OF_HEADER, Protocol::NO_END_OF_HEADER),
    (HookFlags::BODY, Protocol::NO_BODY),
    (HookFlags::UNKNOWN, Protocol::NO_UNKNOWN),
];

const NO_REPLY_TABLE: &[(HookFlags, Protocol)] = &[
    (HookFlags::CONNECT, Protocol::NR_CONNECT),
    (HookFlags::HELO, Protocol::NR_HELO),
    (HookFlags::MAIL, Protocol::NR_MAIL),
    (HookFlags::RCPT, Protocol::NR_RECIPIENT),
    (HookFlags::DATA, Protocol::NR_DATA),
    (HookFlags::HEADER, Protocol::NR_HEADER),
    (HookFlags::END_OF_HEADER, Protocol::NR_END_OF_HEADER),
    (HookFlags::BODY, Protocol::NR_BODY),
    (HookFlags::UNKNOWN, Protocol::NR_UNKNOWN),
];

/// Compute the reply to an options-negotiate offer.
///
/// # Errors
/// Returns [`ProtocolError::CompatibilityError`] if the MTA's offered
/// version is below [`SUPPORTED_VERSION`], or [`ProtocolError::ActionNotOffered`]
/// if `decl` requires manipulation capabilities the MTA did not offer.
pub fn negotiate(offer: &OptNeg, decl: &AppDecl, header_leading_space: bool) -> Result<OptNeg, ProtocolError> {
    if offer.version < SUPPORTED_VERSION {
        return Err(CompatibilityError::UnsupportedVersion {
            received: offer.version,
            supported: SUPPORTED_VERSION,
        }
        .into());
    }

    let wanted_actions = decl.capabilities;
    if !offer.capabilities.contains(wanted_actions) {
        return Err(ProtocolError::ActionNotOffered {
            required: wanted_actions.bits(),
            offered: offer.capabilities.bits(),
        });
    }

    let mut wanted_protocol = Protocol::empty();

    for (hook, skip_bit) in SKIP_TABLE {
        if !decl.hooks.contains(*hook) && offer.protocol.contains(*skip_bit) {
            wanted_protocol |= *skip_bit;
        }
    }

    for (hook, no_reply_bit) in NO_REPLY_TABLE {
        if decl.hooks.contains(*hook)
            && decl.no_reply.contains(*hook)
            && offer.protocol.contains(*no_reply_bit)
        {
            wanted_protocol |= *no_reply_bit;
        }
    }

    if decl.include_rejected_rcpts && offer.protocol.contains(Protocol::SMFIP_RCPT_REJ) {
        wanted_protocol |= Protocol::SMFIP_RCPT_REJ;
    }

    if offer.protocol.contains(Protocol::SMFIP_SKIP) {
        wanted_protocol |= Protocol::SMFIP_SKIP;
    }

    if header_leading_space && offer.protocol.contains(Protocol::SMFIP_HDR_LEADSPC) {
        wanted_protocol |= Protocol::SMFIP_HDR_LEADSPC;
    }

    Ok(OptNeg {
        version: SUPPORTED_VERSION,
        capabilities: wanted_actions,
        protocol: wanted_protocol,
        macro_stages: decl.macro_stages.clone(),
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use oxmilter_common::optneg::Capability;
    use pretty_assertions::assert_eq;

    #[test]
    fn no_hooks_asks_to_skip_every_callback_the_mta_offered() {
        let offer = OptNeg {
            version: 6,
            capabilities: Capability::all(),
            protocol: Protocol::all(),
            macro_stages: Default::default(),
        };
        let decl = AppDecl::default();

        let reply = negotiate(&offer, &decl, false).expect("negotiation should succeed");

        assert_eq!(reply.version, 6);
        assert_eq!(reply.capabilities, Capability::empty());
        for (_, skip_bit) in SKIP_TABLE {
            assert!(reply.protocol.contains(*skip_bit));
        }
    }

    #[test]
    fn rejects_version_below_six() {
        let offer = OptNeg {
            version: 2,
            capabilities: Capability::empty(),
            protocol: Protocol::empty(),
            macro_stages: Default::default(),
        };

        let err = negotiate(&offer, &AppDecl::default(), false).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::CompatibilityError(CompatibilityError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn rejects_required_capability_the_mta_did_not_offer() {
        let offer = OptNeg {
            version: 6,
            capabilities: Capability::SMFIF_ADDHDRS,
            protocol: Protocol::all(),
            macro_stages: Default::default(),
        };
        let decl = AppDecl {
            capabilities: Capability::SMFIF_CHGBODY,
            ..AppDecl::default()
        };

        let err = negotiate(&offer, &decl, false).unwrap_err();
        assert!(matches!(err, ProtocolError::ActionNotOffered { .. }));
    }

    #[test]
    fn declared_no_reply_hook_only_sets_the_bit_if_offered() {
        let offer = OptNeg {
            version: 6,
            capabilities: Capability::empty(),
            protocol: Protocol::NR_MAIL,
            macro_stages: Default::default(),
        };
        let decl = AppDecl {
            hooks: HookFlags::MAIL,
            no_reply: HookFlags::MAIL,
            ..AppDecl::default()
        };

        let reply = negotiate(&offer, &decl, false).expect("negotiation should succeed");
        assert!(reply.protocol.contains(Protocol::NR_MAIL));
        assert!(!reply.protocol.contains(Protocol::NO_MAIL));
    }
}
