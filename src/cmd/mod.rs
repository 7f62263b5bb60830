pub mod evaluate;
pub mod run;
