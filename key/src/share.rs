// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use lantern_crypto::poly::{PriShare, PubPoly};
use lantern_crypto::G1Projective;

/// The private output a node holds after a successful DKG.
///
/// This information must stay private: `pri_share` is one evaluation of the
/// distributed secret. The commitments are shared by all participants and
/// define the group's public polynomial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Share {
    pub commits: Vec<G1Projective>,
    pub pri_share: PriShare,
}

impl Share {
    pub fn new(commits: Vec<G1Projective>, pri_share: PriShare) -> Self {
        Self { commits, pri_share }
    }

    /// The node's index in the sharing.
    pub fn index(&self) -> u32 {
        self.pri_share.index
    }

    /// The distributed public key this share belongs to.
    pub fn public_key(&self) -> &G1Projective {
        &self.commits[0]
    }

    pub fn pub_poly(&self) -> PubPoly {
        PubPoly::from_commits(self.commits.clone())
    }

    pub fn private(&self) -> &PriShare {
        &self.pri_share
    }
}
