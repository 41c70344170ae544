pub mod inprogress;
pub mod shutdown;
