// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Secret and public polynomials over the BLS12-381 scalar field, the
//! building blocks of Shamir sharing and of the distributed key generation.
//!
//! A share for index `i` is the polynomial evaluated at `x = i + 1`; zero is
//! reserved for the secret itself.

use crate::{CryptoError, G1Projective, Scalar};
use ff::Field;
use group::Group;
use rand::RngCore;

/// One evaluation of a secret polynomial, held by the node at `index`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriShare {
    pub index: u32,
    pub value: Scalar,
}

/// A secret polynomial of degree `threshold - 1`.
#[derive(Debug, Clone)]
pub struct PriPoly {
    coeffs: Vec<Scalar>,
}

impl PriPoly {
    /// Samples a fresh random polynomial with a random secret.
    pub fn random<R: RngCore>(threshold: u32, rng: &mut R) -> Self {
        let coeffs = (0..threshold).map(|_| Scalar::random(&mut *rng)).collect();
        Self { coeffs }
    }

    /// Samples a polynomial with a fixed constant term. Used by resharing,
    /// where a dealer re-splits its existing share.
    pub fn with_secret<R: RngCore>(secret: Scalar, threshold: u32, rng: &mut R) -> Self {
        let mut coeffs = vec![secret];
        coeffs.extend((1..threshold).map(|_| Scalar::random(&mut *rng)));
        Self { coeffs }
    }

    pub fn secret(&self) -> &Scalar {
        &self.coeffs[0]
    }

    pub fn threshold(&self) -> u32 {
        self.coeffs.len() as u32
    }

    /// Evaluates the polynomial at the x coordinate of share `index`.
    pub fn eval(&self, index: u32) -> PriShare {
        let x = Scalar::from(u64::from(index) + 1);
        let mut value = Scalar::ZERO;
        for coeff in self.coeffs.iter().rev() {
            value = value * x + coeff;
        }
        PriShare { index, value }
    }

    /// Evaluates the first `n` shares.
    pub fn shares(&self, n: u32) -> Vec<PriShare> {
        (0..n).map(|i| self.eval(i)).collect()
    }

    /// Commits every coefficient to G1.
    pub fn commit(&self) -> PubPoly {
        let commits = self
            .coeffs
            .iter()
            .map(|c| G1Projective::generator() * c)
            .collect();
        PubPoly { commits }
    }

    /// Coefficient-wise sum of two polynomials of the same degree.
    pub fn add(&self, other: &PriPoly) -> Result<PriPoly, CryptoError> {
        if self.coeffs.len() != other.coeffs.len() {
            return Err(CryptoError::DegreeMismatch);
        }
        let coeffs = self
            .coeffs
            .iter()
            .zip(&other.coeffs)
            .map(|(a, b)| a + b)
            .collect();
        Ok(PriPoly { coeffs })
    }
}

/// The public commitment to a secret polynomial. Its constant term is the
/// (distributed) public key; evaluations are the public counterparts of the
/// individual shares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PubPoly {
    commits: Vec<G1Projective>,
}

impl PubPoly {
    pub fn from_commits(commits: Vec<G1Projective>) -> Self {
        Self { commits }
    }

    pub fn commits(&self) -> &[G1Projective] {
        &self.commits
    }

    pub fn threshold(&self) -> u32 {
        self.commits.len() as u32
    }

    /// The committed secret: the distributed public key.
    pub fn public_key(&self) -> &G1Projective {
        &self.commits[0]
    }

    /// Evaluates the commitment at the x coordinate of share `index`.
    pub fn eval(&self, index: u32) -> G1Projective {
        let x = Scalar::from(u64::from(index) + 1);
        let mut value = G1Projective::identity();
        for commit in self.commits.iter().rev() {
            value = value * x + commit;
        }
        value
    }

    /// Coefficient-wise sum of two commitments of the same degree.
    pub fn add(&self, other: &PubPoly) -> Result<PubPoly, CryptoError> {
        if self.commits.len() != other.commits.len() {
            return Err(CryptoError::DegreeMismatch);
        }
        let commits = self
            .commits
            .iter()
            .zip(&other.commits)
            .map(|(a, b)| a + b)
            .collect();
        Ok(PubPoly { commits })
    }
}

/// Lagrange basis coefficient at zero for `index`, over the given share
/// index set: `prod_{j != i} x_j / (x_j - x_i)`.
pub fn lagrange_basis(indices: &[u32], index: u32) -> Result<Scalar, CryptoError> {
    let xi = Scalar::from(u64::from(index) + 1);
    let mut num = Scalar::ONE;
    let mut den = Scalar::ONE;
    for &j in indices {
        if j == index {
            continue;
        }
        let xj = Scalar::from(u64::from(j) + 1);
        num *= xj;
        den *= xj - xi;
    }
    let inv = den.invert().into_option().ok_or(CryptoError::DuplicateShare(index))?;
    Ok(num * inv)
}

/// Recovers the secret from `threshold` distinct shares by interpolation at
/// zero.
pub fn recover_secret(shares: &[PriShare], threshold: u32) -> Result<Scalar, CryptoError> {
    let mut seen = Vec::with_capacity(threshold as usize);
    let mut used = Vec::with_capacity(threshold as usize);
    for share in shares {
        if seen.contains(&share.index) {
            continue;
        }
        seen.push(share.index);
        used.push(share.clone());
        if used.len() == threshold as usize {
            break;
        }
    }
    if used.len() < threshold as usize {
        return Err(CryptoError::NotEnoughShares(
            used.len(),
            threshold as usize,
        ));
    }
    let indices: Vec<u32> = used.iter().map(|s| s.index).collect();
    let mut secret = Scalar::ZERO;
    for share in &used {
        secret += lagrange_basis(&indices, share.index)? * share.value;
    }
    Ok(secret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn shares_recover_the_secret() {
        let mut rng = rng();
        let poly = PriPoly::random(3, &mut rng);
        let shares = poly.shares(5);
        let secret = recover_secret(&shares[1..4], 3).unwrap();
        assert_eq!(&secret, poly.secret());
        // Any other subset agrees.
        let secret = recover_secret(&[shares[4].clone(), shares[0].clone(), shares[2].clone()], 3)
            .unwrap();
        assert_eq!(&secret, poly.secret());
    }

    #[test]
    fn recovery_needs_threshold_shares() {
        let mut rng = rng();
        let poly = PriPoly::random(3, &mut rng);
        let shares = poly.shares(2);
        assert_eq!(
            recover_secret(&shares, 3),
            Err(CryptoError::NotEnoughShares(2, 3))
        );
    }

    #[test]
    fn commitment_matches_shares() {
        let mut rng = rng();
        let poly = PriPoly::random(4, &mut rng);
        let commit = poly.commit();
        for share in poly.shares(6) {
            assert_eq!(
                G1Projective::generator() * share.value,
                commit.eval(share.index)
            );
        }
    }

    #[test]
    fn added_polys_share_their_sum() {
        let mut rng = rng();
        let a = PriPoly::random(3, &mut rng);
        let b = PriPoly::random(3, &mut rng);
        let sum = a.add(&b).unwrap();
        assert_eq!(sum.secret(), &(a.secret() + b.secret()));
        assert_eq!(
            a.commit().add(&b.commit()).unwrap().public_key(),
            sum.commit().public_key()
        );
    }
}
