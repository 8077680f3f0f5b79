pub mod work_area;

pub use work_area::WorkArea;
