/*
 * paperback: paper backup generator suitable for long-term storage
 * Copyright (C) 2018-2022 Aleksa Sarai <cyphar@cyphar.com>
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use std::ops::Add;

use itertools::Itertools;
use num_bigint::{BigUint, RandBigInt};
use num_traits::{One, Zero};
use rand::{CryptoRng, RngCore};

use crate::shamir::field;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("polynomial degree must be at least zero (threshold at least one)")]
    InvalidDegree,

    #[error("modulus not provided or modulus isn't prime")]
    InvalidModulus,

    #[error("too few points for lagrange interpolation: needed {needed} but was given {num_points}")]
    TooFewPoints { needed: usize, num_points: usize },

    #[error("detected inconsistent points (same x, different y)")]
    InconsistentPoints,

    #[error("[critical security issue] all points must have an invertible (non-zero) x value")]
    NonInvertiblePoint,
}

/// (x, y) in the prime field.
pub type Point = (BigUint, BigUint);

/// A polynomial over `Z/pZ`.
// The coefficients are in *increasing* degree (x^0, x^1, ..., x^n).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Polynomial(Vec<BigUint>);

impl Drop for Polynomial {
    fn drop(&mut self) {
        // Best-effort scrub of the (secret) coefficients.
        for coeff in &mut self.0 {
            *coeff = BigUint::zero();
        }
    }
}

impl Polynomial {
    /// Generate a random polynomial of the given degree, with every
    /// coefficient sampled uniformly from `[1, prime)`.
    pub fn new_rand<R: RngCore + CryptoRng + ?Sized>(
        degree: u32,
        prime: &BigUint,
        rng: &mut R,
    ) -> Self {
        Self(
            (0..=degree)
                .map(|_| {
                    // We must make sure that none of the coefficients are
                    // zero. This is purely an abundance of caution, but it
                    // ensures we don't accidentally end up with a polynomial
                    // that has too few effective coefficients (making it
                    // easier to invert).
                    let mut coeff = BigUint::zero();
                    while coeff.is_zero() {
                        coeff = rng.gen_biguint_below(prime);
                    }
                    coeff
                })
                .collect::<Vec<_>>(),
        )
    }

    pub(crate) fn coefficients(&self) -> &[BigUint] {
        &self.0
    }

    /// Retrieve the constant term of the polynomial.
    pub fn constant(&self) -> &BigUint {
        self.0
            .first()
            .expect("Polynomial must have at least one coefficient")
    }

    /// Overwrite the constant term of the polynomial. Note that this
    /// invalidates all previously computed `Polynomial::evaluate` results.
    pub fn set_constant(&mut self, constant: BigUint) {
        *self
            .0
            .first_mut()
            .expect("Polynomial must have at least one coefficient") = constant;
    }

    /// Return the degree of the polynomial (the largest power of x).
    pub fn degree(&self) -> u32 {
        match self.0.len() {
            0 => panic!("Polynomial must have at least one coefficient"),
            n => (n - 1) as u32,
        }
    }

    /// Evaluate the polynomial at a given `x` value, modulo `prime`.
    ///
    /// This is an implementation of Horner's method which applies the
    /// modular reduction at each step, resulting in only O(n) operations on
    /// numbers that never grow past two limbs' worth of the modulus.
    pub fn evaluate(&self, x: &BigUint, prime: &BigUint) -> Result<BigUint, Error> {
        if !field::probably_prime(prime, field::OPERATION_PRIME_ROUNDS) {
            return Err(Error::InvalidModulus);
        }
        // Make sure that x isn't larger than the modulus.
        let x = x % prime;

        // Since we order the coefficients in terms of increasing degree, we
        // need to iterate in reverse.
        let mut result = BigUint::zero();
        for coeff in self.0.iter().rev() {
            result = (result * &x + coeff) % prime;
        }
        Ok(result)
    }

    /// Interpolate the full polynomial of degree `threshold - 1` passing
    /// through the given points.
    ///
    /// This is significantly less efficient than `interpolate_constant`, but
    /// as it produces the entire polynomial it is possible to compute new
    /// (x, y) points afterwards. In the context of Shamir Secret Sharing
    /// this is what allows new shards to be created that are compatible with
    /// the old shards.
    pub fn interpolate(
        threshold: u32,
        prime: &BigUint,
        points: &[Point],
    ) -> Result<Self, Error> {
        if threshold < 1 {
            return Err(Error::InvalidDegree);
        }
        if !field::probably_prime(prime, field::OPERATION_PRIME_ROUNDS) {
            return Err(Error::InvalidModulus);
        }
        let points = unique_points(points, prime)?;
        let k = threshold as usize;
        if points.len() < k {
            return Err(Error::TooFewPoints {
                needed: k,
                num_points: points.len(),
            });
        }
        let points = &points[..k];

        // We re-arrange the classical Lagrange interpolation expression
        //
        //     L(x) = \sum_{j=0}^k y_j l_j(x)
        //   l_j(x) = \prod_{m=0,m!=j}^{k} \frac{x-x_m}{x_j-x_m}
        //
        // into something a little easier to handle when expanded as a
        // polynomial
        //
        //   l_j(x) = \frac{\prod_m x-x_m}{\prod_m x_j-x_m}
        //
        // where the denominator is a constant, and the numerator expands as
        // a multi-binomial
        //
        //   (x-a_1) \dots (x-a_n) = \sum_{i=0}^{n} SUM_COMB({-a}, i) x^i
        //
        // with SUM_COMB({x}, i) the sum over all i-length combinations
        // (without replacement) of the set {x}. The proof is left to the
        // reader, but if you expand the product by hand the pattern shows up
        // very quickly:
        //
        //   p_1(x) =                                                                x + a
        //   p_2(x) =                                         x^2 +             (a+b)x + ab
        //   p_3(x) =                x^3 +             (a+b+c)x^2 +        (ab+ac+bc)x + abc
        //   p_4(x) = x^4 + (a+b+c+d)x^3 + (ab+ac+ad+bc+bd+cd)x^2 + (abc+abd+acd+bcd)x + abcd
        let polys = (0..k).map(|j| {
            let (xj, yj) = &points[j];
            let others = (0..k).filter(|&m| m != j).collect::<Vec<_>>();

            // \frac{y_j}{\prod_{m!=j} x_j-x_m}
            let denominator = others.iter().fold(BigUint::one(), |acc, &m| {
                acc * field::mod_sub(xj, &points[m].0, prime) % prime
            });
            let scale = yj
                * field::mod_inverse(&denominator, prime)
                    .expect("denominator of distinct points cannot be zero")
                % prime;

            // \sum_{i} SUM_COMB({-x_m}, i) x^i, scaled.
            let neg_roots = others
                .iter()
                .map(|&m| field::mod_neg(&points[m].0, prime))
                .collect::<Vec<_>>();
            let coeffs = (0..k)
                .map(|power| {
                    let comb_len = (k - 1) - power;
                    neg_roots
                        .iter()
                        .combinations(comb_len)
                        .map(|set| {
                            set.into_iter()
                                .fold(BigUint::one(), |acc, root| acc * root % prime)
                        })
                        .fold(BigUint::zero(), |acc, term| (acc + term) % prime)
                })
                .map(|coeff| coeff * &scale % prime)
                .collect::<Vec<_>>();

            Polynomial(coeffs)
        });

        Ok(polys
            .map(|poly| poly.reduce(prime))
            .reduce(Add::add)
            .expect("must be at least one lagrange basis polynomial")
            .reduce(prime))
    }

    // Reduce every coefficient mod prime. Addition of lagrange basis
    // polynomials is done coefficient-wise without reduction, so this keeps
    // the representation canonical.
    fn reduce(mut self, prime: &BigUint) -> Self {
        for coeff in &mut self.0 {
            *coeff = &*coeff % prime;
        }
        self
    }
}

impl Add for Polynomial {
    type Output = Self;
    fn add(mut self, rhs: Self) -> Self::Output {
        for (idx, rhs_coeff) in rhs.0.iter().enumerate() {
            match self.0.get_mut(idx) {
                Some(lhs_coeff) => *lhs_coeff += rhs_coeff,
                None => self.0.push(rhs_coeff.clone()),
            }
        }
        self
    }
}

// Returns the subset of points that are unique (determined by the reduced
// x-value), erroring out if two points have the same x but different y.
fn unique_points(points: &[Point], prime: &BigUint) -> Result<Vec<Point>, Error> {
    let mut unique: Vec<Point> = Vec::with_capacity(points.len());
    for (x, y) in points {
        let (x, y) = (x % prime, y % prime);
        match unique.iter().find(|(seen_x, _)| *seen_x == x) {
            Some((_, seen_y)) if *seen_y != y => return Err(Error::InconsistentPoints),
            Some(_) => continue,
            None => {
                if x.is_zero() {
                    return Err(Error::NonInvertiblePoint);
                }
                unique.push((x, y));
            }
        }
    }
    Ok(unique)
}

/// Interpolate only the constant term of the polynomial of degree
/// `threshold - 1` passing through the given points.
///
/// In order to avoid the overhead of computing all of the coefficients of
/// the polynomial, we use the optimised closed form for `L(0)` (with k the
/// number of points):
///
///   L(0) = \sum_{j=0}^{k} y_j \prod_{m=0,m!=j}^{k} \frac{x_m}{x_m-x_j}
///
/// The denominator inverses are computed with Fermat's little theorem.
pub fn interpolate_constant(
    threshold: u32,
    prime: &BigUint,
    points: &[Point],
) -> Result<BigUint, Error> {
    if threshold < 1 {
        return Err(Error::InvalidDegree);
    }
    if !field::probably_prime(prime, field::OPERATION_PRIME_ROUNDS) {
        return Err(Error::InvalidModulus);
    }
    let points = unique_points(points, prime)?;
    let k = threshold as usize;
    if points.len() < k {
        return Err(Error::TooFewPoints {
            needed: k,
            num_points: points.len(),
        });
    }
    let points = &points[..k];

    let mut l0 = BigUint::zero();
    for j in 0..k {
        let (xj, yj) = &points[j];
        let mut term = yj.clone();
        for m in (0..k).filter(|&m| m != j) {
            let xm = &points[m].0;
            let inv = field::mod_inverse(&field::mod_sub(xm, xj, prime), prime)
                .expect("denominator of distinct points cannot be zero");
            term = term * xm % prime * inv % prime;
        }
        l0 = (l0 + term) % prime;
    }
    Ok(l0)
}

#[cfg(test)]
mod test {
    use super::*;

    use std::sync::OnceLock;

    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    // A deterministic 129-bit prime shared by the tests. Generating it once
    // (instead of hardcoding a constant) guarantees it really is prime.
    fn test_prime() -> &'static BigUint {
        static PRIME: OnceLock<BigUint> = OnceLock::new();
        PRIME.get_or_init(|| {
            field::generate_prime(&mut ChaCha20Rng::seed_from_u64(0x7061706572), 129)
        })
    }

    fn test_rng() -> ChaCha20Rng {
        ChaCha20Rng::seed_from_u64(0x6261636b7570)
    }

    // Inefficient, but "obviously correct" implementation of
    // Polynomial::evaluate(), to compare against.
    fn manual_evaluate(poly: &Polynomial, x: &BigUint, prime: &BigUint) -> BigUint {
        poly.coefficients()
            .iter()
            .enumerate()
            .fold(BigUint::zero(), |acc, (power, coeff)| {
                (acc + coeff * x.modpow(&BigUint::from(power), prime)) % prime
            })
    }

    fn sample_points<R: RngCore + CryptoRng>(
        poly: &Polynomial,
        count: usize,
        prime: &BigUint,
        rng: &mut R,
    ) -> Vec<Point> {
        let mut points = Vec::with_capacity(count);
        while points.len() < count {
            let x = rng.gen_biguint_below(prime);
            if x.is_zero() || points.iter().any(|(seen, _): &Point| *seen == x) {
                continue;
            }
            let y = poly.evaluate(&x, prime).unwrap();
            points.push((x, y));
        }
        points
    }

    #[quickcheck]
    fn polynomial_evaluate_matches_naive(degree: u8, x: u64) -> bool {
        let prime = test_prime();
        let mut rng = test_rng();
        let poly = Polynomial::new_rand(degree as u32 % 16, prime, &mut rng);
        let x = BigUint::from(x);
        poly.evaluate(&x, prime).unwrap() == manual_evaluate(&poly, &(&x % prime), prime)
    }

    #[quickcheck]
    fn polynomial_constant_is_evaluate_at_zero(degree: u8) -> bool {
        let prime = test_prime();
        let mut rng = test_rng();
        let poly = Polynomial::new_rand(degree as u32 % 16, prime, &mut rng);
        poly.evaluate(&BigUint::zero(), prime).unwrap() == *poly.constant()
    }

    #[quickcheck]
    fn interpolate_constant_recovers_constant(degree: u8) -> bool {
        let prime = test_prime();
        let mut rng = test_rng();
        let threshold = (degree as u32 % 8) + 1;
        let poly = Polynomial::new_rand(threshold - 1, prime, &mut rng);
        let points = sample_points(&poly, threshold as usize, prime, &mut rng);
        interpolate_constant(threshold, prime, &points).unwrap() == *poly.constant()
    }

    #[quickcheck]
    fn interpolate_recovers_polynomial(degree: u8) -> bool {
        let prime = test_prime();
        let mut rng = test_rng();
        let threshold = (degree as u32 % 8) + 1;
        let poly = Polynomial::new_rand(threshold - 1, prime, &mut rng);
        let points = sample_points(&poly, threshold as usize, prime, &mut rng);
        let recovered = Polynomial::interpolate(threshold, prime, &points).unwrap();
        recovered == poly
    }

    #[quickcheck]
    fn interpolated_polynomial_evaluates_identically(degree: u8, x: u64) -> bool {
        let prime = test_prime();
        let mut rng = test_rng();
        let threshold = (degree as u32 % 8) + 1;
        let poly = Polynomial::new_rand(threshold - 1, prime, &mut rng);
        let points = sample_points(&poly, threshold as usize, prime, &mut rng);
        let recovered = Polynomial::interpolate(threshold, prime, &points).unwrap();
        let x = BigUint::from(x);
        recovered.evaluate(&x, prime).unwrap() == poly.evaluate(&x, prime).unwrap()
    }

    #[test]
    fn interpolate_tolerates_extra_and_duplicate_points() {
        let prime = test_prime();
        let mut rng = test_rng();
        let poly = Polynomial::new_rand(2, prime, &mut rng);
        let mut points = sample_points(&poly, 5, prime, &mut rng);
        points.push(points[0].clone());
        assert_eq!(
            interpolate_constant(3, prime, &points).unwrap(),
            *poly.constant()
        );
    }

    #[test]
    fn interpolate_rejects_inconsistent_points() {
        let prime = test_prime();
        let mut rng = test_rng();
        let poly = Polynomial::new_rand(2, prime, &mut rng);
        let mut points = sample_points(&poly, 3, prime, &mut rng);
        let (x, y) = points[0].clone();
        points.push((x, (y + 1u32) % prime));
        assert!(matches!(
            interpolate_constant(3, prime, &points),
            Err(Error::InconsistentPoints)
        ));
        assert!(matches!(
            Polynomial::interpolate(3, prime, &points),
            Err(Error::InconsistentPoints)
        ));
    }

    #[test]
    fn interpolate_rejects_too_few_points() {
        let prime = test_prime();
        let mut rng = test_rng();
        let poly = Polynomial::new_rand(3, prime, &mut rng);
        let points = sample_points(&poly, 3, prime, &mut rng);
        assert!(matches!(
            interpolate_constant(4, prime, &points),
            Err(Error::TooFewPoints { needed: 4, num_points: 3 })
        ));
    }

    #[test]
    fn interpolate_rejects_zero_threshold() {
        let prime = test_prime();
        assert!(matches!(
            interpolate_constant(0, prime, &[]),
            Err(Error::InvalidDegree)
        ));
    }

    #[test]
    fn interpolate_rejects_composite_modulus() {
        let composite = BigUint::from(1u32) << 128u32;
        let points = vec![
            (BigUint::from(1u32), BigUint::from(2u32)),
            (BigUint::from(2u32), BigUint::from(3u32)),
        ];
        assert!(matches!(
            interpolate_constant(2, &composite, &points),
            Err(Error::InvalidModulus)
        ));
    }

    #[test]
    fn interpolate_rejects_zero_x() {
        let prime = test_prime();
        let points = vec![
            (BigUint::zero(), BigUint::from(2u32)),
            (BigUint::from(2u32), BigUint::from(3u32)),
        ];
        assert!(matches!(
            interpolate_constant(2, prime, &points),
            Err(Error::NonInvertiblePoint)
        ));
    }

    #[test]
    fn threshold_one_polynomials_work() {
        let prime = test_prime();
        let mut rng = test_rng();
        let mut poly = Polynomial::new_rand(0, prime, &mut rng);
        poly.set_constant(BigUint::from(42u32));
        let points = sample_points(&poly, 1, prime, &mut rng);
        assert_eq!(
            interpolate_constant(1, prime, &points).unwrap(),
            BigUint::from(42u32)
        );
        let recovered = Polynomial::interpolate(1, prime, &points).unwrap();
        assert_eq!(recovered.constant(), &BigUint::from(42u32));
    }
}
