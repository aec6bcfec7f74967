pub mod effects;
pub mod filters;
pub mod painter;
pub mod paintops;
pub mod resources;
pub mod shapes;
