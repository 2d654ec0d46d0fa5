// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! The Pedersen DKG state: deal generation and verification, the response
//! status matrix, justification handling and certification.
//!
//! Two modes share the machinery. In a fresh run every new-group member
//! deals a random secret and the distributed key is the sum of the
//! qualified contributions. In a resharing the dealers are the old-group
//! members, each re-splitting its existing share; the contributions are
//! combined with Lagrange weights so the distributed public key is
//! preserved while shares and group composition change.

use crate::DkgError;
use lantern_crypto::poly::{lagrange_basis, PriPoly, PriShare, PubPoly};
use lantern_crypto::{
    bls, g1_from_bytes, g1_to_bytes, scalar_from_bytes, scalar_to_bytes, sharebox, G1Projective,
    Scalar,
};
use ff::Field;
use group::Group;
use lantern_net::{Deal, DealShare, EncryptedShare, Justification, Response};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Inputs of one DKG execution, extracted from the group files.
pub struct GeneratorConfig {
    /// Long-term secret of this node.
    pub longterm: Scalar,
    /// Public keys of the share holders, in new-group order.
    pub new_nodes: Vec<G1Projective>,
    /// Public keys of the dealers when resharing, in old-group order.
    pub old_nodes: Option<Vec<G1Projective>>,
    /// Public polynomial of the old group; required when resharing.
    pub public_coeffs: Option<Vec<G1Projective>>,
    /// Our share of the old group's key, when we deal in a resharing.
    pub share: Option<PriShare>,
    pub threshold: u32,
    pub old_threshold: u32,
}

struct ProcessedDeal {
    commits: PubPoly,
    /// Our decrypted share of this dealer's polynomial; absent after a
    /// complaint until a valid justification reveals it.
    share: Option<Scalar>,
}

/// Which holders approved which dealer's deal. Dealers that are themselves
/// share holders implicitly approve their own deal; everyone can derive
/// those entries from the group descriptions alone.
struct StatusMatrix {
    statuses: BTreeMap<u32, BTreeMap<u32, bool>>,
}

impl StatusMatrix {
    fn new(dealer_keys: &[G1Projective], holder_keys: &[G1Projective]) -> Self {
        let mut statuses: BTreeMap<u32, BTreeMap<u32, bool>> = BTreeMap::new();
        for (dealer, key) in dealer_keys.iter().enumerate() {
            let row = statuses.entry(dealer as u32).or_default();
            if let Some(holder) = holder_keys.iter().position(|k| k == key) {
                row.insert(holder as u32, true);
            }
        }
        Self { statuses }
    }

    fn set(&mut self, dealer: u32, holder: u32, approved: bool) {
        self.statuses
            .entry(dealer)
            .or_default()
            .entry(holder)
            .or_insert(approved);
    }

    fn approvals(&self, dealer: u32) -> usize {
        self.statuses
            .get(&dealer)
            .map(|row| row.values().filter(|approved| **approved).count())
            .unwrap_or(0)
    }

    fn has_complaint(&self, dealer: u32) -> bool {
        self.statuses
            .get(&dealer)
            .map(|row| row.values().any(|approved| !approved))
            .unwrap_or(false)
    }

    fn approved(&self, dealer: u32, holder: u32) -> bool {
        self.statuses
            .get(&dealer)
            .and_then(|row| row.get(&holder))
            .copied()
            .unwrap_or(false)
    }

    fn resolve(&mut self, dealer: u32, holder: u32) {
        self.statuses
            .entry(dealer)
            .or_default()
            .insert(holder, true);
    }
}

/// One participant's view of a running DKG.
pub struct DistKeyGenerator {
    longterm: Scalar,
    new_nodes: Vec<G1Projective>,
    dealers: Vec<G1Projective>,
    threshold: u32,
    /// Number of qualified deals required to finish: the old threshold when
    /// resharing, the new one otherwise.
    dealer_threshold: u32,
    is_resharing: bool,
    old_pub_poly: Option<PubPoly>,
    old_share: Option<PriShare>,
    /// Our index among the share holders, when we are one.
    new_index: Option<u32>,
    /// Our index among the dealers, when we are one.
    dealer_index: Option<u32>,
    session_id: Vec<u8>,
    secret_poly: Option<PriPoly>,
    deals: BTreeMap<u32, ProcessedDeal>,
    statuses: StatusMatrix,
    timed_out: bool,
}

impl DistKeyGenerator {
    pub fn new(config: GeneratorConfig) -> Result<Self, DkgError> {
        let GeneratorConfig {
            longterm,
            new_nodes,
            old_nodes,
            public_coeffs,
            share,
            threshold,
            old_threshold,
        } = config;
        if new_nodes.is_empty() || threshold == 0 || threshold as usize > new_nodes.len() {
            return Err(DkgError::ConfigInvalid("bad new group or threshold"));
        }
        let public = bls::public_key(&longterm);
        let new_index = new_nodes.iter().position(|k| k == &public).map(|i| i as u32);

        let is_resharing = old_nodes.is_some();
        let dealers = old_nodes.unwrap_or_else(|| new_nodes.clone());
        let dealer_index = dealers.iter().position(|k| k == &public).map(|i| i as u32);
        if new_index.is_none() && dealer_index.is_none() {
            return Err(DkgError::ConfigInvalid("key neither in new nor old group"));
        }

        let old_pub_poly = if is_resharing {
            let coeffs = public_coeffs
                .ok_or(DkgError::ConfigInvalid("resharing needs the old public key"))?;
            Some(PubPoly::from_commits(coeffs))
        } else {
            None
        };
        if is_resharing && dealer_index.is_some() && share.is_none() {
            return Err(DkgError::ConfigInvalid("resharing dealer needs its share"));
        }
        let dealer_threshold = if is_resharing { old_threshold } else { threshold };
        if dealer_threshold == 0 || dealer_threshold as usize > dealers.len() {
            return Err(DkgError::ConfigInvalid("bad dealer threshold"));
        }

        let session_id = session_id(&new_nodes, threshold, old_pub_poly.as_ref(), old_threshold);
        let statuses = StatusMatrix::new(&dealers, &new_nodes);
        Ok(Self {
            longterm,
            statuses,
            dealers,
            new_nodes,
            threshold,
            dealer_threshold,
            is_resharing,
            old_pub_poly,
            old_share: share,
            new_index,
            dealer_index,
            session_id,
            secret_poly: None,
            deals: BTreeMap::new(),
            timed_out: false,
        })
    }

    pub fn new_index(&self) -> Option<u32> {
        self.new_index
    }

    pub fn session_id(&self) -> &[u8] {
        &self.session_id
    }

    /// Generates the encrypted deals, one per share holder other than
    /// ourselves, and records our own contribution locally.
    pub fn deals<R: RngCore>(&mut self, rng: &mut R) -> Result<Vec<(u32, Deal)>, DkgError> {
        let dealer_index = self.dealer_index.ok_or(DkgError::NotADealer)?;
        if self.secret_poly.is_some() {
            return Err(DkgError::DealsAlreadyIssued);
        }
        let poly = match (self.is_resharing, &self.old_share) {
            (true, Some(old)) => PriPoly::with_secret(old.value, self.threshold, rng),
            (true, None) => return Err(DkgError::ConfigInvalid("resharing dealer needs its share")),
            (false, _) => PriPoly::random(self.threshold, rng),
        };
        let pub_poly = poly.commit();
        let commits: Vec<Vec<u8>> = pub_poly.commits().iter().map(g1_to_bytes).collect();

        let mut out = Vec::with_capacity(self.new_nodes.len());
        for (holder, key) in self.new_nodes.iter().enumerate() {
            let holder = holder as u32;
            let share = poly.eval(holder);
            if Some(holder) == self.new_index {
                // Our own share never travels; the matrix already carries
                // the implicit self-approval.
                self.deals.insert(
                    dealer_index,
                    ProcessedDeal {
                        commits: pub_poly.clone(),
                        share: Some(share.value),
                    },
                );
                continue;
            }
            let boxed = sharebox::seal(rng, key, &scalar_to_bytes(&share.value))?;
            let signature = bls::sign(
                &self.longterm,
                &deal_share_message(&self.session_id, dealer_index, holder, &commits, &boxed),
            );
            out.push((
                holder,
                Deal {
                    dealer_index,
                    commits: commits.clone(),
                    shares: vec![DealShare {
                        share_index: holder,
                        encrypted: EncryptedShare {
                            dh_key: boxed.dh_key,
                            signature,
                            nonce: boxed.nonce,
                            cipher: boxed.cipher,
                        },
                    }],
                    session_id: self.session_id.clone(),
                },
            ));
        }
        self.secret_poly = Some(poly);
        Ok(out)
    }

    /// Processes a dealer's deal and produces our response to broadcast.
    pub fn process_deal(&mut self, deal: &Deal) -> Result<Response, DkgError> {
        let my_index = self.new_index.ok_or(DkgError::NotAShareHolder)?;
        if deal.session_id != self.session_id {
            return Err(DkgError::SessionMismatch);
        }
        let dealer_key = self
            .dealers
            .get(deal.dealer_index as usize)
            .ok_or(DkgError::UnknownDealer(deal.dealer_index))?;
        if self.deals.contains_key(&deal.dealer_index) {
            return Err(DkgError::DuplicateDeal(deal.dealer_index));
        }
        if deal.commits.len() != self.threshold as usize {
            return Err(DkgError::ConfigInvalid("wrong commitment count in deal"));
        }
        let commits = deal
            .commits
            .iter()
            .map(|c| g1_from_bytes(c))
            .collect::<Result<Vec<_>, _>>()?;
        let pub_poly = PubPoly::from_commits(commits);

        let entry = deal
            .shares
            .iter()
            .find(|s| s.share_index == my_index)
            .ok_or(DkgError::ConfigInvalid("no share addressed to us in deal"))?;
        let boxed = sharebox::ShareBox {
            dh_key: entry.encrypted.dh_key.clone(),
            nonce: entry.encrypted.nonce.clone(),
            cipher: entry.encrypted.cipher.clone(),
        };
        bls::verify(
            dealer_key,
            &deal_share_message(
                &self.session_id,
                deal.dealer_index,
                my_index,
                &deal.commits,
                &boxed,
            ),
            &entry.encrypted.signature,
        )
        .map_err(|_| DkgError::InvalidSignature)?;

        // From here on a failure is the dealer's fault: complain instead of
        // dropping the deal.
        let mut share = None;
        let mut approved = true;
        if self.is_resharing {
            // The dealt polynomial must open to the dealer's old share.
            let old = self.old_pub_poly.as_ref().expect("checked at construction");
            if pub_poly.public_key() != &old.eval(deal.dealer_index) {
                approved = false;
            }
        }
        if approved {
            match sharebox::open(&self.longterm, &boxed)
                .and_then(|plain| scalar_from_bytes(&plain))
            {
                Ok(value) if bls::public_key(&value) == pub_poly.eval(my_index) => {
                    share = Some(value);
                }
                _ => approved = false,
            }
        }

        self.deals.insert(
            deal.dealer_index,
            ProcessedDeal {
                commits: pub_poly,
                share,
            },
        );
        self.statuses.set(deal.dealer_index, my_index, approved);
        Ok(self.make_response(deal.dealer_index, my_index, approved))
    }

    /// Applies a holder's response. When it is a complaint against our own
    /// deal, returns the justification to broadcast.
    pub fn process_response(
        &mut self,
        response: &Response,
    ) -> Result<Option<Justification>, DkgError> {
        if response.session_id != self.session_id {
            return Err(DkgError::SessionMismatch);
        }
        let holder_key = self
            .new_nodes
            .get(response.share_index as usize)
            .ok_or(DkgError::UnknownShareHolder(response.share_index))?;
        if self.dealers.get(response.dealer_index as usize).is_none() {
            return Err(DkgError::UnknownDealer(response.dealer_index));
        }
        bls::verify(
            holder_key,
            &response_message(
                &self.session_id,
                response.dealer_index,
                response.share_index,
                response.approved,
            ),
            &response.signature,
        )
        .map_err(|_| DkgError::InvalidSignature)?;
        // Share holders process a dealer's deal before any response about
        // it; the handler buffers early responses. Old nodes that left the
        // new group never receive deals and track responses directly.
        if self.new_index.is_some() && !self.deals.contains_key(&response.dealer_index) {
            return Err(DkgError::NoDealBeforeResponse);
        }

        self.statuses.set(
            response.dealer_index,
            response.share_index,
            response.approved,
        );

        if !response.approved && self.dealer_index == Some(response.dealer_index) {
            if let Some(poly) = &self.secret_poly {
                let share = poly.eval(response.share_index);
                let justification = self.make_justification(response, &share.value);
                return Ok(Some(justification));
            }
        }
        Ok(None)
    }

    /// Applies a justification: a dealer revealing a disputed share.
    pub fn process_justification(&mut self, justification: &Justification) -> Result<(), DkgError> {
        if justification.session_id != self.session_id {
            return Err(DkgError::SessionMismatch);
        }
        let dealer_key = self
            .dealers
            .get(justification.dealer_index as usize)
            .ok_or(DkgError::UnknownDealer(justification.dealer_index))?;
        bls::verify(
            dealer_key,
            &justification_message(
                &self.session_id,
                justification.dealer_index,
                justification.share_index,
                &justification.share,
            ),
            &justification.signature,
        )
        .map_err(|_| DkgError::InvalidSignature)?;
        let value = scalar_from_bytes(&justification.share)?;

        match self.deals.get_mut(&justification.dealer_index) {
            Some(deal) => {
                if bls::public_key(&value) != deal.commits.eval(justification.share_index) {
                    // The reveal does not match the commitments either; the
                    // complaint stands.
                    return Ok(());
                }
                if Some(justification.share_index) == self.new_index {
                    deal.share = Some(value);
                }
                self.statuses
                    .resolve(justification.dealer_index, justification.share_index);
                Ok(())
            }
            None if self.new_index.is_none() => {
                // Leavers cannot check commitments they never received; the
                // dealer's signature is the best they can do.
                self.statuses
                    .resolve(justification.dealer_index, justification.share_index);
                Ok(())
            }
            None => Err(DkgError::NoDealBeforeResponse),
        }
    }

    /// After the timeout, certification proceeds with the responses seen so
    /// far.
    pub fn set_timeout(&mut self) {
        self.timed_out = true;
    }

    /// Every deal is approved by every share holder.
    pub fn certified(&self) -> bool {
        (0..self.dealers.len() as u32).all(|dealer| {
            !self.statuses.has_complaint(dealer)
                && self.statuses.approvals(dealer) == self.new_nodes.len()
        })
    }

    /// Enough deals are approved by enough holders to finish the protocol.
    /// Only meaningful once the timeout fired; before that, missing
    /// responses may still arrive and full certification is required.
    pub fn threshold_certified(&self) -> bool {
        self.timed_out && self.qualified_dealers().len() >= self.dealer_threshold as usize
    }

    /// Dealers whose deal has no standing complaint and at least a
    /// threshold of approvals.
    pub fn qualified_dealers(&self) -> Vec<u32> {
        (0..self.dealers.len() as u32)
            .filter(|dealer| {
                !self.statuses.has_complaint(*dealer)
                    && self.statuses.approvals(*dealer) >= self.threshold as usize
            })
            .collect()
    }

    /// Share-holder indices with a correctly generated share: in a fresh
    /// run the qualified dealers themselves, in a resharing the holders
    /// that approved at least a dealer-threshold of qualified deals.
    pub fn qualified_shares(&self) -> Vec<u32> {
        let qualified = self.qualified_dealers();
        if !self.is_resharing {
            return qualified;
        }
        (0..self.new_nodes.len() as u32)
            .filter(|holder| {
                let approvals = qualified
                    .iter()
                    .filter(|dealer| self.statuses.approved(**dealer, *holder))
                    .count();
                approvals >= self.dealer_threshold as usize
            })
            .collect()
    }

    /// Combines the qualified contributions into this node's distributed
    /// key share.
    pub fn dist_key_share(&self) -> Result<lantern_key::Share, DkgError> {
        let my_index = self.new_index.ok_or(DkgError::NotAShareHolder)?;
        let qualified = self.qualified_dealers();
        if qualified.len() < self.dealer_threshold as usize {
            return Err(DkgError::NotEnoughQualified(
                qualified.len(),
                self.dealer_threshold as usize,
            ));
        }
        let mut value = Scalar::ZERO;
        let mut commits = vec![G1Projective::identity(); self.threshold as usize];
        for dealer in &qualified {
            let deal = self
                .deals
                .get(dealer)
                .ok_or(DkgError::MissingDealerShare(*dealer))?;
            let share = deal.share.ok_or(DkgError::MissingDealerShare(*dealer))?;
            let weight = if self.is_resharing {
                lagrange_basis(&qualified, *dealer)?
            } else {
                Scalar::ONE
            };
            value += share * weight;
            for (k, commit) in deal.commits.commits().iter().enumerate() {
                commits[k] += commit * weight;
            }
        }
        Ok(lantern_key::Share::new(
            commits,
            PriShare {
                index: my_index,
                value,
            },
        ))
    }

    fn make_response(&self, dealer: u32, holder: u32, approved: bool) -> Response {
        let signature = bls::sign(
            &self.longterm,
            &response_message(&self.session_id, dealer, holder, approved),
        );
        Response {
            dealer_index: dealer,
            share_index: holder,
            approved,
            session_id: self.session_id.clone(),
            signature,
        }
    }

    fn make_justification(&self, response: &Response, share: &Scalar) -> Justification {
        let share = scalar_to_bytes(share);
        let signature = bls::sign(
            &self.longterm,
            &justification_message(
                &self.session_id,
                response.dealer_index,
                response.share_index,
                &share,
            ),
        );
        Justification {
            dealer_index: response.dealer_index,
            share_index: response.share_index,
            share,
            session_id: self.session_id.clone(),
            signature,
        }
    }
}

fn session_id(
    new_nodes: &[G1Projective],
    threshold: u32,
    old_pub_poly: Option<&PubPoly>,
    old_threshold: u32,
) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(b"lantern-dkg-session");
    for key in new_nodes {
        hasher.update(g1_to_bytes(key));
    }
    hasher.update(threshold.to_be_bytes());
    if let Some(poly) = old_pub_poly {
        for commit in poly.commits() {
            hasher.update(g1_to_bytes(commit));
        }
        hasher.update(old_threshold.to_be_bytes());
    }
    hasher.finalize().to_vec()
}

fn deal_share_message(
    session_id: &[u8],
    dealer: u32,
    holder: u32,
    commits: &[Vec<u8>],
    boxed: &sharebox::ShareBox,
) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(b"lantern-dkg-deal");
    hasher.update(session_id);
    hasher.update(dealer.to_be_bytes());
    hasher.update(holder.to_be_bytes());
    for commit in commits {
        hasher.update(commit);
    }
    hasher.update(&boxed.dh_key);
    hasher.update(&boxed.nonce);
    hasher.update(&boxed.cipher);
    hasher.finalize().to_vec()
}

fn response_message(session_id: &[u8], dealer: u32, holder: u32, approved: bool) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(b"lantern-dkg-response");
    hasher.update(session_id);
    hasher.update(dealer.to_be_bytes());
    hasher.update(holder.to_be_bytes());
    hasher.update([approved as u8]);
    hasher.finalize().to_vec()
}

fn justification_message(session_id: &[u8], dealer: u32, holder: u32, share: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(b"lantern-dkg-justification");
    hasher.update(session_id);
    hasher.update(dealer.to_be_bytes());
    hasher.update(holder.to_be_bytes());
    hasher.update(share);
    hasher.finalize().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lantern_crypto::poly::recover_secret;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn keys(rng: &mut StdRng, n: usize) -> (Vec<Scalar>, Vec<G1Projective>) {
        let secrets: Vec<Scalar> = (0..n).map(|_| Scalar::random(&mut *rng)).collect();
        let publics = secrets.iter().map(bls::public_key).collect();
        (secrets, publics)
    }

    fn fresh_generators(
        secrets: &[Scalar],
        publics: &[G1Projective],
        threshold: u32,
    ) -> Vec<DistKeyGenerator> {
        secrets
            .iter()
            .map(|secret| {
                DistKeyGenerator::new(GeneratorConfig {
                    longterm: *secret,
                    new_nodes: publics.to_vec(),
                    old_nodes: None,
                    public_coeffs: None,
                    share: None,
                    threshold,
                    old_threshold: 0,
                })
                .unwrap()
            })
            .collect()
    }

    /// Runs deals then responses across all generators, as the network
    /// would, returning the produced responses.
    fn run_exchange(
        rng: &mut StdRng,
        gens: &mut [DistKeyGenerator],
        tamper: Option<(usize, u32)>,
    ) -> Vec<Justification> {
        let mut all_deals = Vec::new();
        for gen in gens.iter_mut() {
            if gen.dealer_index.is_some() {
                for (recipient, mut deal) in gen.deals(rng).unwrap() {
                    if let Some((bad_dealer, bad_holder)) = tamper {
                        if deal.dealer_index == bad_dealer as u32 && recipient == bad_holder {
                            deal.shares[0].encrypted.cipher[0] ^= 0xff;
                        }
                    }
                    all_deals.push((recipient, deal));
                }
            }
        }
        let mut responses = Vec::new();
        for (recipient, deal) in &all_deals {
            // Route by holder index: find the generator with that new index.
            let gen = gens
                .iter_mut()
                .find(|g| g.new_index == Some(*recipient))
                .unwrap();
            responses.push(gen.process_deal(deal).unwrap());
        }
        let mut justifications = Vec::new();
        for response in &responses {
            for gen in gens.iter_mut() {
                if gen.new_index == Some(response.share_index) {
                    continue;
                }
                match gen.process_response(response) {
                    Ok(Some(justification)) => justifications.push(justification),
                    Ok(None) => {}
                    Err(e) => panic!("response rejected: {e}"),
                }
            }
        }
        justifications
    }

    #[test]
    fn fresh_dkg_fully_certifies() {
        let mut rng = StdRng::seed_from_u64(41);
        let (secrets, publics) = keys(&mut rng, 4);
        let mut gens = fresh_generators(&secrets, &publics, 3);

        let justifications = run_exchange(&mut rng, &mut gens, None);
        assert!(justifications.is_empty());

        let shares: Vec<lantern_key::Share> = gens
            .iter()
            .map(|gen| {
                assert!(gen.certified());
                gen.dist_key_share().unwrap()
            })
            .collect();
        // Everyone agrees on the commitments.
        for share in &shares[1..] {
            assert_eq!(share.commits, shares[0].commits);
        }
        // The shares interpolate to the committed secret.
        let pri_shares: Vec<PriShare> = shares.iter().map(|s| s.pri_share.clone()).collect();
        let secret = recover_secret(&pri_shares, 3).unwrap();
        assert_eq!(&bls::public_key(&secret), shares[0].public_key());
    }

    #[test]
    fn complaint_is_resolved_by_justification() {
        let mut rng = StdRng::seed_from_u64(42);
        let (secrets, publics) = keys(&mut rng, 4);
        let mut gens = fresh_generators(&secrets, &publics, 3);

        // Dealer 1's share for holder 2 is corrupted in flight.
        let justifications = run_exchange(&mut rng, &mut gens, Some((1, 2)));
        assert_eq!(justifications.len(), 1);
        assert!(!gens[2].certified());

        for justification in &justifications {
            for gen in gens.iter_mut() {
                gen.process_justification(justification).unwrap();
            }
        }
        let shares: Vec<lantern_key::Share> = gens
            .iter()
            .map(|gen| {
                assert!(gen.certified());
                gen.dist_key_share().unwrap()
            })
            .collect();
        for share in &shares[1..] {
            assert_eq!(share.commits, shares[0].commits);
        }
        let pri_shares: Vec<PriShare> = shares.iter().map(|s| s.pri_share.clone()).collect();
        recover_secret(&pri_shares, 3).unwrap();
    }

    #[test]
    fn resharing_preserves_the_distributed_key() {
        let mut rng = StdRng::seed_from_u64(43);
        let (old_secrets, old_publics) = keys(&mut rng, 4);
        let mut old_gens = fresh_generators(&old_secrets, &old_publics, 3);
        run_exchange(&mut rng, &mut old_gens, None);
        let old_shares: Vec<lantern_key::Share> =
            old_gens.iter().map(|g| g.dist_key_share().unwrap()).collect();
        let old_public = *old_shares[0].public_key();
        let old_commits = old_shares[0].commits.clone();

        // Node 0 leaves; two fresh nodes join.
        let (mut new_secrets, mut new_publics) = keys(&mut rng, 2);
        let mut secrets: Vec<Scalar> = old_secrets[1..].to_vec();
        secrets.append(&mut new_secrets);
        let mut publics: Vec<G1Projective> = old_publics[1..].to_vec();
        publics.append(&mut new_publics);

        let mut gens: Vec<DistKeyGenerator> = Vec::new();
        // The leaver deals but holds nothing afterwards.
        for (i, secret) in old_secrets.iter().enumerate() {
            gens.push(
                DistKeyGenerator::new(GeneratorConfig {
                    longterm: *secret,
                    new_nodes: publics.clone(),
                    old_nodes: Some(old_publics.clone()),
                    public_coeffs: Some(old_commits.clone()),
                    share: Some(old_shares[i].pri_share.clone()),
                    threshold: 3,
                    old_threshold: 3,
                })
                .unwrap(),
            );
        }
        for secret in &secrets[3..] {
            gens.push(
                DistKeyGenerator::new(GeneratorConfig {
                    longterm: *secret,
                    new_nodes: publics.clone(),
                    old_nodes: Some(old_publics.clone()),
                    public_coeffs: Some(old_commits.clone()),
                    share: None,
                    threshold: 3,
                    old_threshold: 3,
                })
                .unwrap(),
            );
        }

        let justifications = run_exchange(&mut rng, &mut gens, None);
        assert!(justifications.is_empty());

        // The leaver observes certification without holding a share.
        assert!(gens[0].certified());
        assert!(gens[0].dist_key_share().is_err());
        assert_eq!(gens[0].qualified_shares().len(), 5);

        let new_shares: Vec<lantern_key::Share> = gens[1..]
            .iter()
            .map(|gen| {
                assert!(gen.certified());
                gen.dist_key_share().unwrap()
            })
            .collect();
        for share in &new_shares {
            // Reshared commitments open to the old distributed key.
            assert_eq!(share.public_key(), &old_public);
        }
        let pri_shares: Vec<PriShare> =
            new_shares.iter().map(|s| s.pri_share.clone()).collect();
        let secret = recover_secret(&pri_shares, 3).unwrap();
        assert_eq!(bls::public_key(&secret), old_public);
    }
}
