pub mod eastmoney;
pub mod parse;

pub use eastmoney::EastmoneyProvider;
