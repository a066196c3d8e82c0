pub mod jupiter;

pub use jupiter::{JupiterClient, Quote, SwapApi, DEFAULT_JUPITER_URL};
