pub mod modular;
pub mod ntt;
pub mod poly;
pub mod rns;

pub use modular::{barrett_reduce, center, is_prime, mod_add, mod_inv, mod_mul, mod_neg, mod_pow, mod_sub};
pub use ntt::NttPoly;
pub use poly::CoeffPoly;
pub use rns::{RnsBasis, RnsPoly};
