pub mod inspect;
pub mod lifecycle;
