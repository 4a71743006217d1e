pub mod celeba_database;
pub mod dcgan;
pub mod device;
pub mod logging;
pub mod metrics;
pub mod util;
