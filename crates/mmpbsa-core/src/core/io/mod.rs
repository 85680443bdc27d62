pub mod checkpoint;
pub mod results;
pub mod trajectory;
