//! Userfiles Processing Library
//!
//! Pure and near-pure stages of the upload pipeline: content inspection,
//! policy validation, name templating and derivative rendering.

pub mod inspector;
pub mod naming;
#[cfg(feature = "image")]
pub mod thumbnail;
pub mod validator;

pub use inspector::{ContentInspector, InspectError};
pub use naming::{
    random_token, slugify, NameTemplater, NamingError, NamingInput, Placeholders, ResizeParams,
    Token,
};
#[cfg(feature = "image")]
pub use thumbnail::{DerivativeRenderer, ImageThumbnailer, RenderedDerivative};
pub use validator::{PolicyValidator, ValidationError};
