//! Black-Scholes pricing, delta, and implied volatility.
//!
//! Implied volatility is recovered with a safeguarded Newton iteration:
//! Newton steps on vega while they stay inside the current bracket,
//! bisection otherwise. The search is bounded to [`VOL_MIN`, `VOL_MAX`].

use std::f64::consts::{PI, SQRT_2};

use statrs::function::erf::erfc;
use thiserror::Error;

use crate::data::OptionType;

/// Lower bound of the volatility search.
pub const VOL_MIN: f64 = 0.01;

/// Upper bound of the volatility search.
pub const VOL_MAX: f64 = 5.0;

/// Absolute price error accepted as converged.
pub const PRICE_TOLERANCE: f64 = 1e-5;

/// Iteration cap for the root-find.
pub const MAX_ITERATIONS: usize = 100;

/// Implied volatility failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConvergenceError {
    #[error("Degenerate input: {0}")]
    DegenerateInput(&'static str),

    #[error("Price {price:.4} outside model range [{min:.4}, {max:.4}]")]
    OutOfBounds { price: f64, min: f64, max: f64 },

    #[error("No convergence after {iterations} iterations (last error {error:.2e})")]
    MaxIterations { iterations: usize, error: f64 },
}

/// Successful implied volatility solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IvResult {
    /// Implied volatility (annualized, decimal)
    pub iv: f64,
    /// Delta at the implied volatility
    pub delta: f64,
}

/// Black-Scholes calculator for options pricing and Greeks.
#[derive(Debug, Clone, Copy)]
pub struct BlackScholes {
    /// Risk-free interest rate
    pub rate: f64,
    /// Dividend yield
    pub dividend: f64,
}

impl Default for BlackScholes {
    fn default() -> Self {
        Self {
            rate: 0.05,
            dividend: 0.0,
        }
    }
}

impl BlackScholes {
    pub fn new(rate: f64, dividend: f64) -> Self {
        Self { rate, dividend }
    }

    fn d1(&self, spot: f64, strike: f64, time: f64, vol: f64) -> f64 {
        let numerator =
            (spot / strike).ln() + (self.rate - self.dividend + 0.5 * vol * vol) * time;
        numerator / (vol * time.sqrt())
    }

    fn d2(&self, spot: f64, strike: f64, time: f64, vol: f64) -> f64 {
        self.d1(spot, strike, time, vol) - vol * time.sqrt()
    }

    /// Standard normal CDF.
    pub fn norm_cdf(x: f64) -> f64 {
        0.5 * erfc(-x / SQRT_2)
    }

    /// Standard normal PDF.
    pub fn norm_pdf(x: f64) -> f64 {
        (-0.5 * x * x).exp() / (2.0 * PI).sqrt()
    }

    /// Calculate call option price.
    pub fn call_price(&self, spot: f64, strike: f64, time: f64, vol: f64) -> f64 {
        if time <= 0.0 {
            return (spot - strike).max(0.0);
        }

        let d1 = self.d1(spot, strike, time, vol);
        let d2 = self.d2(spot, strike, time, vol);

        spot * (-self.dividend * time).exp() * Self::norm_cdf(d1)
            - strike * (-self.rate * time).exp() * Self::norm_cdf(d2)
    }

    /// Calculate put option price.
    pub fn put_price(&self, spot: f64, strike: f64, time: f64, vol: f64) -> f64 {
        if time <= 0.0 {
            return (strike - spot).max(0.0);
        }

        let d1 = self.d1(spot, strike, time, vol);
        let d2 = self.d2(spot, strike, time, vol);

        strike * (-self.rate * time).exp() * Self::norm_cdf(-d2)
            - spot * (-self.dividend * time).exp() * Self::norm_cdf(-d1)
    }

    /// Calculate option price based on type.
    pub fn price(&self, spot: f64, strike: f64, time: f64, vol: f64, opt_type: OptionType) -> f64 {
        match opt_type {
            OptionType::Call => self.call_price(spot, strike, time, vol),
            OptionType::Put => self.put_price(spot, strike, time, vol),
        }
    }

    /// Calculate delta.
    pub fn delta(&self, spot: f64, strike: f64, time: f64, vol: f64, opt_type: OptionType) -> f64 {
        if time <= 0.0 {
            return match opt_type {
                OptionType::Call => {
                    if spot > strike {
                        1.0
                    } else {
                        0.0
                    }
                }
                OptionType::Put => {
                    if spot < strike {
                        -1.0
                    } else {
                        0.0
                    }
                }
            };
        }

        let d1 = self.d1(spot, strike, time, vol);
        let discount = (-self.dividend * time).exp();

        match opt_type {
            OptionType::Call => discount * Self::norm_cdf(d1),
            OptionType::Put => discount * (Self::norm_cdf(d1) - 1.0),
        }
    }

    /// Raw vega (price change per 1.00 change in volatility).
    pub fn vega(&self, spot: f64, strike: f64, time: f64, vol: f64) -> f64 {
        if time <= 0.0 {
            return 0.0;
        }

        let d1 = self.d1(spot, strike, time, vol);
        spot * (-self.dividend * time).exp() * Self::norm_pdf(d1) * time.sqrt()
    }

    /// Recover implied volatility from a market price.
    ///
    /// The returned volatility reprices the option within
    /// [`PRICE_TOLERANCE`]. Prices outside what the model can produce on
    /// [`VOL_MIN`, `VOL_MAX`] (including prices below intrinsic) fail with
    /// [`ConvergenceError::OutOfBounds`].
    pub fn implied_vol(
        &self,
        spot: f64,
        strike: f64,
        time: f64,
        price: f64,
        opt_type: OptionType,
    ) -> Result<IvResult, ConvergenceError> {
        if !(price.is_finite() && price > 0.0) {
            return Err(ConvergenceError::DegenerateInput("option price must be positive"));
        }
        if !(spot.is_finite() && spot > 0.0) {
            return Err(ConvergenceError::DegenerateInput("underlying price must be positive"));
        }
        if !(strike.is_finite() && strike > 0.0) {
            return Err(ConvergenceError::DegenerateInput("strike must be positive"));
        }
        if !(time.is_finite() && time > 0.0) {
            return Err(ConvergenceError::DegenerateInput("time to expiry must be positive"));
        }

        let result = |iv: f64| IvResult {
            iv,
            delta: self.delta(spot, strike, time, iv, opt_type),
        };

        let mut lo = VOL_MIN;
        let mut hi = VOL_MAX;
        let price_lo = self.price(spot, strike, time, lo, opt_type);
        let price_hi = self.price(spot, strike, time, hi, opt_type);

        if (price_lo - price).abs() < PRICE_TOLERANCE {
            return Ok(result(lo));
        }
        if (price_hi - price).abs() < PRICE_TOLERANCE {
            return Ok(result(hi));
        }
        if price < price_lo || price > price_hi {
            return Err(ConvergenceError::OutOfBounds {
                price,
                min: price_lo,
                max: price_hi,
            });
        }

        // Brenner-Subrahmanyam starting point
        let mut vol = ((price / spot) * (2.0 * PI / time).sqrt()).clamp(lo, hi);
        let mut error = f64::INFINITY;

        for _ in 0..MAX_ITERATIONS {
            let diff = self.price(spot, strike, time, vol, opt_type) - price;
            error = diff.abs();

            if error < PRICE_TOLERANCE {
                return Ok(result(vol));
            }

            // Price is increasing in vol, so the sign of diff moves the bracket
            if diff > 0.0 {
                hi = vol;
            } else {
                lo = vol;
            }

            let vega = self.vega(spot, strike, time, vol);
            let newton = vol - diff / vega;
            vol = if vega > 1e-10 && newton > lo && newton < hi {
                newton
            } else {
                0.5 * (lo + hi)
            };
        }

        Err(ConvergenceError::MaxIterations {
            iterations: MAX_ITERATIONS,
            error,
        })
    }
}
