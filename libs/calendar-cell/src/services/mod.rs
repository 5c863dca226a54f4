pub mod freebusy;
