pub mod celeba_batcher;
pub mod celeba_dataset;
