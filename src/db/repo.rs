mod activity;
mod activity_db;
mod activity_mem;
mod chest;
mod chest_db;
mod chest_mem;
mod item;
mod item_db;
mod item_mem;

pub use activity_db::ActivityRepository;
pub use chest_db::ChestRepository;
pub use item_db::ItemRepository;

pub use activity_mem::MemoryActivityRepository;
pub use chest_mem::MemoryChestRepository;
pub use item_mem::MemoryItemRepository;

pub use activity::ActivityRepo;
pub use chest::ChestRepo;
pub use item::ItemRepo;
