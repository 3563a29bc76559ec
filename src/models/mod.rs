pub mod notificationmodel;
pub mod taskmodel;
pub mod usermodel;
pub mod walletmodels;
