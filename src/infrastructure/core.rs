mod archive;
mod request;
mod resource;

pub use self::archive::*;
pub use self::request::*;
pub use self::resource::*;
