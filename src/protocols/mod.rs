pub mod a2m;
