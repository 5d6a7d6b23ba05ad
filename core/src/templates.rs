//! Software-stack templates applied to freshly created environments

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// A named bundle of packages plus a setup script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    /// Stable ID referenced at creation time
    pub id: String,
    /// Human-readable label
    pub name: String,
    pub description: String,
    /// Ubuntu release, e.g. "22.04"; LXD adds its own image remote
    pub base_image: String,
    pub packages: Vec<String>,
    /// Shell script run as root after the packages are installed
    pub setup_script: String,
    #[serde(default)]
    pub builtin: bool,
}

impl Template {
    /// Check the fields a custom template must carry
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::validation("Template ID cannot be empty"));
        }
        if self.name.trim().is_empty() {
            return Err(Error::validation("Template name cannot be empty"));
        }
        if self.description.trim().is_empty() {
            return Err(Error::validation("Template description cannot be empty"));
        }
        if self.base_image.trim().is_empty() {
            return Err(Error::validation("Template base image cannot be empty"));
        }
        Ok(())
    }
}

struct BuiltinTemplate {
    id: &'static str,
    name: &'static str,
    description: &'static str,
    packages: &'static [&'static str],
    setup_script: &'static str,
}

const BASE_IMAGE: &str = "22.04";

const COMMON_PACKAGES: [&str; 9] = [
    "curl",
    "wget",
    "git",
    "vim",
    "htop",
    "tree",
    "unzip",
    "build-essential",
    "software-properties-common",
];

const PYTHON_PACKAGES: [&str; 4] = ["python3", "python3-pip", "python3-venv", "python3-dev"];

const APT_REPO_PACKAGES: [&str; 4] = [
    "apt-transport-https",
    "ca-certificates",
    "gnupg",
    "lsb-release",
];

const DOCKER_SETUP: &str = r#"install -m 0755 -d /etc/apt/keyrings
curl -fsSL https://download.docker.com/linux/ubuntu/gpg | gpg --dearmor -o /etc/apt/keyrings/docker.gpg
echo "deb [arch=$(dpkg --print-architecture) signed-by=/etc/apt/keyrings/docker.gpg] https://download.docker.com/linux/ubuntu $(lsb_release -cs) stable" > /etc/apt/sources.list.d/docker.list
apt-get update
apt-get install -y docker-ce docker-ce-cli containerd.io docker-compose-plugin
usermod -aG docker ubuntu
"#;

const GIT_DEFAULTS: &str = "sudo -u ubuntu git config --global init.defaultBranch main\n";

const BUILTIN: &[BuiltinTemplate] = &[
    BuiltinTemplate {
        id: "ubuntu-basic",
        name: "Ubuntu Basic",
        description: "Basic Ubuntu environment with essential development tools",
        packages: &["apt-transport-https"],
        setup_script: r#"sudo -u ubuntu git config --global init.defaultBranch main
echo 'export EDITOR=vim' >> /home/ubuntu/.bashrc
"#,
    },
    BuiltinTemplate {
        id: "nodejs-dev",
        name: "Node.js Development",
        description: "Node.js LTS with npm, yarn, TypeScript and common tooling",
        packages: &[],
        setup_script: r#"curl -fsSL https://deb.nodesource.com/setup_lts.x | bash -
apt-get install -y nodejs
npm install -g yarn typescript ts-node eslint prettier nodemon
sudo -u ubuntu mkdir -p /home/ubuntu/projects
"#,
    },
    BuiltinTemplate {
        id: "python-dev",
        name: "Python Development",
        description: "Python 3 with pip, virtualenv, poetry and popular packages",
        packages: &PYTHON_PACKAGES,
        setup_script: r#"python3 -m pip install --upgrade pip
pip3 install virtualenv pipenv poetry
pip3 install requests flask django fastapi
pip3 install pytest black flake8 mypy
sudo -u ubuntu mkdir -p /home/ubuntu/projects
"#,
    },
    BuiltinTemplate {
        id: "go-dev",
        name: "Go Development",
        description: "Latest Go toolchain with gopls and golangci-lint",
        packages: &[],
        setup_script: r#"GO_TARBALL=$(curl -fsSL 'https://go.dev/VERSION?m=text' | head -1).linux-amd64.tar.gz
curl -fsSLO "https://go.dev/dl/${GO_TARBALL}"
rm -rf /usr/local/go && tar -C /usr/local -xzf "${GO_TARBALL}"
rm -f "${GO_TARBALL}"
echo 'export PATH=$PATH:/usr/local/go/bin:/home/ubuntu/go/bin' >> /home/ubuntu/.bashrc
sudo -u ubuntu mkdir -p /home/ubuntu/go/bin /home/ubuntu/go/src /home/ubuntu/go/pkg
sudo -u ubuntu bash -c 'export PATH=$PATH:/usr/local/go/bin && go install golang.org/x/tools/gopls@latest'
sudo -u ubuntu bash -c 'export PATH=$PATH:/usr/local/go/bin && go install github.com/golangci/golangci-lint/cmd/golangci-lint@latest'
"#,
    },
    BuiltinTemplate {
        id: "rust-dev",
        name: "Rust Development",
        description: "Rust via rustup with cargo and rust-analyzer",
        packages: &["pkg-config", "libssl-dev"],
        setup_script: r#"sudo -u ubuntu bash -c 'curl --proto "=https" --tlsv1.2 -sSf https://sh.rustup.rs | sh -s -- -y'
sudo -u ubuntu bash -c 'source /home/ubuntu/.cargo/env && rustup component add rust-analyzer'
sudo -u ubuntu mkdir -p /home/ubuntu/projects
"#,
    },
    BuiltinTemplate {
        id: "java-dev",
        name: "Java Development",
        description: "OpenJDK 17 with Maven and Gradle",
        packages: &["openjdk-17-jdk", "maven", "gradle"],
        setup_script: r#"echo 'JAVA_HOME=/usr/lib/jvm/java-17-openjdk-amd64' >> /etc/environment
echo 'export JAVA_HOME=/usr/lib/jvm/java-17-openjdk-amd64' >> /home/ubuntu/.bashrc
sudo -u ubuntu mkdir -p /home/ubuntu/projects
"#,
    },
    BuiltinTemplate {
        id: "docker-dev",
        name: "Docker Development",
        description: "Docker Engine with the compose plugin",
        packages: &APT_REPO_PACKAGES,
        setup_script: DOCKER_SETUP,
    },
    BuiltinTemplate {
        id: "web-dev",
        name: "Full Stack Web Development",
        description: "Node.js, Python and database clients for full stack work",
        packages: &[
            "python3",
            "python3-pip",
            "python3-venv",
            "postgresql-client",
            "mysql-client",
            "redis-tools",
        ],
        setup_script: r#"curl -fsSL https://deb.nodesource.com/setup_lts.x | bash -
apt-get install -y nodejs
npm install -g yarn typescript eslint prettier
pip3 install django flask fastapi sqlalchemy alembic pytest black
sudo -u ubuntu mkdir -p /home/ubuntu/projects /home/ubuntu/databases
"#,
    },
    BuiltinTemplate {
        id: "data-science",
        name: "Data Science Environment",
        description: "Jupyter, pandas, scikit-learn and common ML libraries",
        packages: &[
            "python3",
            "python3-pip",
            "python3-venv",
            "python3-dev",
            "libhdf5-dev",
            "pkg-config",
        ],
        setup_script: r#"pip3 install --upgrade pip
pip3 install numpy pandas matplotlib seaborn plotly
pip3 install scipy scikit-learn statsmodels
pip3 install jupyter jupyterlab
pip3 install xgboost lightgbm
sudo -u ubuntu mkdir -p /home/ubuntu/projects /home/ubuntu/datasets /home/ubuntu/notebooks
"#,
    },
    BuiltinTemplate {
        id: "devops",
        name: "DevOps Environment",
        description: "Docker, kubectl, Terraform and Helm",
        packages: &[
            "apt-transport-https",
            "ca-certificates",
            "gnupg",
            "lsb-release",
            "jq",
        ],
        setup_script: r#"install -m 0755 -d /etc/apt/keyrings
curl -fsSL https://download.docker.com/linux/ubuntu/gpg | gpg --dearmor -o /etc/apt/keyrings/docker.gpg
echo "deb [arch=$(dpkg --print-architecture) signed-by=/etc/apt/keyrings/docker.gpg] https://download.docker.com/linux/ubuntu $(lsb_release -cs) stable" > /etc/apt/sources.list.d/docker.list
curl -fsSL https://apt.releases.hashicorp.com/gpg | gpg --dearmor -o /etc/apt/keyrings/hashicorp.gpg
echo "deb [signed-by=/etc/apt/keyrings/hashicorp.gpg] https://apt.releases.hashicorp.com $(lsb_release -cs) main" > /etc/apt/sources.list.d/hashicorp.list
apt-get update
apt-get install -y docker-ce docker-ce-cli containerd.io terraform
usermod -aG docker ubuntu
curl -fsSLo /usr/local/bin/kubectl "https://dl.k8s.io/release/$(curl -fsSL https://dl.k8s.io/release/stable.txt)/bin/linux/amd64/kubectl"
chmod 0755 /usr/local/bin/kubectl
curl -fsSL https://raw.githubusercontent.com/helm/helm/main/scripts/get-helm-3 | bash
"#,
    },
];

impl BuiltinTemplate {
    fn to_template(&self) -> Template {
        let mut packages: Vec<String> = COMMON_PACKAGES.iter().map(|p| p.to_string()).collect();
        for pkg in self.packages {
            if !packages.iter().any(|p| p == pkg) {
                packages.push(pkg.to_string());
            }
        }

        let mut setup_script = self.setup_script.to_string();
        if !setup_script.contains("init.defaultBranch") {
            setup_script.push_str(GIT_DEFAULTS);
        }

        Template {
            id: self.id.to_string(),
            name: self.name.to_string(),
            description: self.description.to_string(),
            base_image: BASE_IMAGE.to_string(),
            packages,
            setup_script,
            builtin: true,
        }
    }
}

/// On-disk format of custom templates
#[derive(Debug, Default, Serialize, Deserialize)]
struct CustomTemplateFile {
    templates: Vec<Template>,
}

/// Built-in templates plus user-defined ones
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateCatalog {
    templates: BTreeMap<String, Template>,
}

impl Default for TemplateCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl TemplateCatalog {
    /// Catalog with only the built-in templates
    pub fn builtin() -> Self {
        let templates = BUILTIN
            .iter()
            .map(|t| (t.id.to_string(), t.to_template()))
            .collect();
        Self { templates }
    }

    /// Get the default custom templates path
    pub fn custom_path() -> PathBuf {
        crate::AppConfig::config_dir().join("templates.json")
    }

    /// Built-ins merged with custom templates from `path`; unreadable files are skipped
    pub fn with_custom_from(path: &Path) -> Self {
        let mut catalog = Self::builtin();
        if let Err(e) = catalog.load_custom(path) {
            log::warn!("Ignoring custom templates in {}: {}", path.display(), e);
        }
        catalog
    }

    /// Get a template by ID
    pub fn get(&self, id: &str) -> Result<&Template> {
        self.templates
            .get(id)
            .ok_or_else(|| Error::TemplateNotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.templates.contains_key(id)
    }

    /// All templates, ordered by ID
    pub fn list(&self) -> Vec<&Template> {
        self.templates.values().collect()
    }

    /// Template IDs mapped to display names
    pub fn names(&self) -> Vec<(String, String)> {
        self.templates
            .values()
            .map(|t| (t.id.clone(), t.name.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Add or replace a custom template
    pub fn add_custom(&mut self, mut template: Template) -> Result<()> {
        template.validate()?;
        if let Some(existing) = self.templates.get(&template.id) {
            if existing.builtin {
                return Err(Error::AlreadyExists(format!(
                    "'{}' is a built-in template",
                    template.id
                )));
            }
        }
        template.builtin = false;
        self.templates.insert(template.id.clone(), template);
        Ok(())
    }

    /// Remove a custom template by ID
    pub fn remove_custom(&mut self, id: &str) -> Result<()> {
        match self.templates.get(id) {
            None => Err(Error::TemplateNotFound(id.to_string())),
            Some(t) if t.builtin => Err(Error::validation(format!(
                "Built-in template '{}' cannot be removed",
                id
            ))),
            Some(_) => {
                self.templates.remove(id);
                Ok(())
            }
        }
    }

    /// Merge custom templates from a JSON file; a missing file is not an error
    pub fn load_custom(&mut self, path: &Path) -> Result<usize> {
        if !path.exists() {
            return Ok(0);
        }
        let content = fs::read_to_string(path)?;
        let file: CustomTemplateFile = serde_json::from_str(&content)?;
        let mut loaded = 0;
        for template in file.templates {
            let id = template.id.clone();
            match self.add_custom(template) {
                Ok(()) => loaded += 1,
                Err(e) => log::warn!("Skipping custom template '{}': {}", id, e),
            }
        }
        Ok(loaded)
    }

    /// Save the custom (non built-in) templates to a JSON file
    pub fn save_custom(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = CustomTemplateFile {
            templates: self
                .templates
                .values()
                .filter(|t| !t.builtin)
                .cloned()
                .collect(),
        };
        fs::write(path, serde_json::to_string_pretty(&file)?)?;
        Ok(())
    }
}
