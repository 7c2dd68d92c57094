/*!
 * Storage
 * Small persisted maps
 */

mod small_map;

pub use small_map::SmallMap;
