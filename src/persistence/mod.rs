mod model_io;
mod regressor;

pub use model_io::ModelIo;
pub use regressor::{
    dump_inverted, dump_regressor, load_feature_mask, save_inverted, save_load,
};
