pub mod component;
pub mod decision;
